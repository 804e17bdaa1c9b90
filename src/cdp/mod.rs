//! CDP client runtime: wire types, the transport task, and the session
//! multiplexer.

mod client;
mod error;
mod transport;
mod types;

pub use client::{CdpClient, CdpConfig, CdpSession};
pub use error::CdpError;
pub use transport::{EVENT_BUFFER, EventStream};
pub use types::{Event, OutboundFrame, ProtocolError};
