//! Image metadata: the image id → coordinate store.

mod ids;
mod store;

pub use ids::{USER_REPORT_PREFIX, image_id_for_path, image_id_from_file_name};
pub use store::{CaptureSource, DocumentError, ImageMetadata, MetadataStore};
