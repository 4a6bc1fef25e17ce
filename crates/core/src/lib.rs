pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{ChainSettings, PointsSettings, Settings};
pub use error::{AppError, Result};
