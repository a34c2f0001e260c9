//! Output writer trait definition.

use crate::error::Result;
use crate::output::DetectionRecord;

/// Trait for writing detection results.
pub trait OutputWriter {
    /// Write the file header (if applicable).
    fn write_header(&mut self) -> Result<()>;

    /// Write a single detection.
    fn write_detection(&mut self, detection: &DetectionRecord) -> Result<()>;

    /// Finalize the output (flush, rename into place, etc.).
    fn finalize(&mut self) -> Result<()>;
}

/// Drive a writer over a full set of detections.
pub fn write_all(writer: &mut dyn OutputWriter, detections: &[DetectionRecord]) -> Result<()> {
    writer.write_header()?;
    for detection in detections {
        writer.write_detection(detection)?;
    }
    writer.finalize()
}
