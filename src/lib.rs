//! dbgtap library - live debug-output capture multiplexing.
//!
//! A native capture subprocess intercepts OS-level debug strings and emits
//! them as JSON lines; this library ingests that stream into a bounded
//! ordered log and multiplexes it to any number of independently filtered,
//! independently paced consumer sessions.
//!
//! # Modules
//!
//! - [`event`] - captured events and the subprocess wire format
//! - [`ringlog`] - bounded ordered log with monotonic sequence numbers
//! - [`filter`] - per-event filter evaluation
//! - [`session`] - consumer sessions and their registry
//! - [`ingest`] - capture subprocess lifecycle and the reader loop
//! - [`manager`] - the orchestrator composing all of the above
//! - [`proclist`] - process enumeration for filter construction
//! - [`mcp`] - MCP tool-call surface over stdio

pub mod event;
pub mod filter;
pub mod ingest;
pub mod manager;
pub mod mcp;
pub mod proclist;
pub mod ringlog;
pub mod session;

// Re-export for convenience
pub use event::DebugEvent;
pub use filter::FilterSpec;
pub use manager::{CaptureConfig, CaptureManager};
