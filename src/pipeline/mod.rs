//! Batch inference pipeline.

mod coordinator;
mod runner;

pub use coordinator::{
    ImageBatch, RunOptions, annotated_path_for, collect_image_files, is_image_file,
    output_path_for,
};
pub use runner::{WrittenOutputs, process_image, run_batch, write_outputs};
