pub mod config;
pub mod error;
pub mod geo;
pub mod text;
pub mod types;

pub use config::{Config, FileConfig};
pub use error::{Result, SitewatchError};
pub use geo::*;
pub use types::*;
