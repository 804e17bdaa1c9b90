//! Browser process management: discovery over the HTTP debugging endpoint
//! and launch/teardown of local browser processes.

mod error;

pub mod discovery;
pub mod launcher;

pub use discovery::{BrowserVersion, TargetInfo, detect_running, query_targets, query_version};
pub use error::BrowserError;
pub use launcher::{
    BrowserInstance, LaunchOptions, find_available_port, find_binary, find_binary_with,
    is_pid_alive, is_port_open, launch, terminate_pid,
};
