pub mod config;
pub mod error;
pub mod types;

pub use error::{RdbsealError, RdbsealResult};
pub use types::{Framing, LogFormat};
