//! Street-view imagery download through the Mapillary Graph API.

mod fetch;
mod mapillary;
mod staging;

pub use fetch::{Coverage, FetchReport, FetchRequest, FetchSettings, fetch_imagery};
pub use mapillary::{ImageEntry, MapillaryClient, PointGeometry, Scalar};
pub use staging::StagingDir;
