//! Bounding box rendering onto annotated image copies.

use crate::constants::annotate::{CAPTION_HEIGHT, DEFAULT_FONT, FONT_SIZE};
use crate::error::{Error, Result};
use crate::inference::{BBox, LabelSet};
use crate::output::DetectionRecord;
use crate::utils::fs::temp_sibling;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, warn};

const CAPTION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_PADDING: i32 = 2;

/// Draws detection boxes and captions.
pub struct Annotator {
    labels: LabelSet,
    font: Option<FontVec>,
    line_width: u32,
}

impl Annotator {
    /// Annotator using `font` for captions, falling back to the system
    /// default font. Without a usable font only boxes are drawn.
    pub fn new(labels: LabelSet, font: Option<&Path>, line_width: u32) -> Self {
        let font_path = font.unwrap_or_else(|| Path::new(DEFAULT_FONT));
        let font = match std::fs::read(font_path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!("Invalid caption font {}: {e}", font_path.display());
                    None
                }
            },
            Err(e) => {
                if font.is_some() {
                    warn!("Cannot read caption font {}: {e}", font_path.display());
                } else {
                    debug!("Default caption font unavailable, drawing boxes only");
                }
                None
            }
        };

        Self {
            labels,
            font,
            line_width: line_width.max(1),
        }
    }

    /// Annotator that never draws captions.
    pub fn boxes_only(labels: LabelSet, line_width: u32) -> Self {
        Self {
            labels,
            font: None,
            line_width: line_width.max(1),
        }
    }

    /// Whether captions will be drawn.
    pub const fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Label set used for colors.
    pub const fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// RGB copy of `image` with `detections` drawn on it.
    ///
    /// Boxes under one pixel in either dimension are skipped.
    pub fn annotate(&self, image: &DynamicImage, detections: &[&DetectionRecord]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for detection in detections {
            let Some(rect) = pixel_rect(detection.bbox) else {
                continue;
            };
            let color = Rgb(self.labels.color(detection.class_id));
            self.draw_outline(&mut canvas, rect, color);
            if let Some(font) = &self.font {
                let caption = format!("{}: {:.2}", detection.label, detection.confidence);
                draw_caption(&mut canvas, font, rect, color, &caption);
            }
        }
        canvas
    }

    /// Annotate and write to `path` (format from extension) atomically.
    pub fn write(
        &self,
        image: &DynamicImage,
        detections: &[&DetectionRecord],
        path: &Path,
    ) -> Result<()> {
        let canvas = self.annotate(image, detections);
        let image_error = |e| Error::ImageWrite {
            path: path.to_path_buf(),
            source: e,
        };
        let format = ImageFormat::from_path(path).map_err(image_error)?;
        let tmp = temp_sibling(path);
        if let Err(e) = canvas.save_with_format(&tmp, format) {
            let _ = std::fs::remove_file(&tmp);
            return Err(image_error(e));
        }
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            Error::Io(e)
        })
    }

    fn draw_outline(&self, canvas: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
        for inset in 0..self.line_width {
            let width = rect.width().saturating_sub(2 * inset);
            let height = rect.height().saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let offset = i32::try_from(inset).unwrap_or(i32::MAX);
            let inner = Rect::at(rect.left() + offset, rect.top() + offset).of_size(width, height);
            draw_hollow_rect_mut(canvas, inner, color);
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_rect(bbox: BBox) -> Option<Rect> {
    if bbox.width() < 1.0 || bbox.height() < 1.0 {
        return None;
    }
    let width = bbox.width().round().max(1.0) as u32;
    let height = bbox.height().round().max(1.0) as u32;
    Some(Rect::at(bbox.x_min.round() as i32, bbox.y_min.round() as i32).of_size(width, height))
}

fn draw_caption(canvas: &mut RgbImage, font: &FontVec, rect: Rect, color: Rgb<u8>, text: &str) {
    let scale = PxScale::from(FONT_SIZE);
    let (text_width, _) = text_size(scale, font, text);
    let band = i32::try_from(CAPTION_HEIGHT).unwrap_or(0);
    // Above the box when it fits, otherwise inside its top edge.
    let top = if rect.top() >= band {
        rect.top() - band
    } else {
        rect.top()
    };

    let available = i64::from(canvas.width()) - i64::from(rect.left());
    let width = u32::try_from(available.min(i64::from(text_width) + 2 * i64::from(CAPTION_PADDING)))
        .unwrap_or(0);
    if width == 0 {
        return;
    }

    draw_filled_rect_mut(
        canvas,
        Rect::at(rect.left(), top).of_size(width, CAPTION_HEIGHT),
        color,
    );
    draw_text_mut(
        canvas,
        CAPTION_TEXT_COLOR,
        rect.left() + CAPTION_PADDING,
        top + CAPTION_PADDING,
        scale,
        font,
        text,
    );
}
