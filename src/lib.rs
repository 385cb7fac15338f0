pub mod alert;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod feeder;
pub mod logging;

pub use error::*;
