//! Command implementations for the MapOpt CLI

pub mod config;
pub mod optimize;
pub mod simulate;
