//! Image identifier extraction from file names.

use std::path::Path;

/// File name prefix of user-reported images.
pub const USER_REPORT_PREFIX: &str = "pothole_";

/// Derive the image id from a file name.
///
/// - `pothole_20251130_091234_567.jpg` → `20251130_091234_567`
/// - `3736697343123377_1578561568299.jpg` → `3736697343123377`
pub fn image_id_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name).file_stem().map_or_else(
        || std::borrow::Cow::Borrowed(file_name),
        |s| s.to_string_lossy(),
    );

    if let Some(rest) = stem.strip_prefix(USER_REPORT_PREFIX)
        && rest.split('_').count() >= 3
    {
        return rest.to_string();
    }

    stem.split('_').next().unwrap_or_default().to_string()
}

/// Derive the image id from a path.
pub fn image_id_for_path(path: &Path) -> String {
    path.file_name().map_or_else(String::new, |name| {
        image_id_from_file_name(&name.to_string_lossy())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downloaded_image_id() {
        assert_eq!(
            image_id_from_file_name("3736697343123377_1578561568299.jpg"),
            "3736697343123377"
        );
    }

    #[test]
    fn test_user_report_id_keeps_timestamp() {
        assert_eq!(
            image_id_from_file_name("pothole_20251130_091234_567.jpg"),
            "20251130_091234_567"
        );
    }

    #[test]
    fn test_short_user_report_falls_back_to_first_part() {
        assert_eq!(image_id_from_file_name("pothole_1.jpg"), "pothole");
    }

    #[test]
    fn test_plain_stem_is_id() {
        assert_eq!(image_id_from_file_name("road.png"), "road");
        assert_eq!(
            image_id_for_path(Path::new("/data/pre/123_2020-01-01T00-00-00.jpg")),
            "123"
        );
    }
}
