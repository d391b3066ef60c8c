//! Data models for specloop

pub mod configuration;
pub mod workflow;

pub use configuration::*;
pub use workflow::*;
