//! Ambient services for specloop

pub mod logging;
