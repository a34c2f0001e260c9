//! Dashboard: session state, action sequencing, map rendering and HTTP server.

mod controller;
mod map;
pub mod server;
mod session;

pub use controller::{Dashboard, Engine, RunOutcome, default_labels, load_markers};
pub use map::{MapData, MapOptions, map_data, render_map};
pub use session::{Mode, SessionContext};
