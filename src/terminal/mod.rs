//! Terminal streaming from the editor extension.
//!
//! A single WebSocket connection multiplexes output from every terminal the
//! extension knows about. [`stream`] maintains the connection (with
//! reconnect-on-abnormal-close), [`protocol`] defines the wire messages, and
//! [`buffer`] keeps a bounded per-terminal scrollback independent of the
//! connection lifecycle.

pub mod buffer;
pub mod protocol;
pub mod stream;

pub use buffer::{TerminalBuffers, TerminalOutputLine, TerminalState};
pub use protocol::{terminal_kind, ClientMessage, ServerMessage, TerminalInfo, TerminalKind};
pub use stream::{
    should_reconnect, ConnectionState, ReconnectPolicy, StreamEvent, StreamHandle, TerminalStream,
};
