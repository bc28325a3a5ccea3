pub mod config;
pub mod ids;
pub mod rights;

pub use ids::*;
pub use rights::{Credentials, Rights};
