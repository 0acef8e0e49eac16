pub mod agent;
pub mod bulk;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};
