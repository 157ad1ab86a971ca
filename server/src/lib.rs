pub mod configuration;
mod error;
pub mod http;
pub mod position;
pub mod renderer;
pub mod routing;
pub mod tracker;

pub use error::TrackerError;
