//! TableInk Application
//!
//! Headless host that wires table sessions to a map store, drives their
//! clocks and renders their frames.

mod client;
mod host;

pub use client::Client;
pub use host::{DemoReport, FrameReport, Host, HostConfig, HostError};
