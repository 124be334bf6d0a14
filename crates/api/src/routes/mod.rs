//! HTTP handlers

pub mod control;
pub mod status;
pub mod video;
