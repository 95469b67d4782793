//! Application core: the per-tick supervisor and its port boundary.

pub mod ports;
pub mod service;
