//! Captured debug events and the wire records the capture subprocess emits.
//!
//! The capture tool writes one JSON object per stdout line. The line carries
//! the tool's own sequence counter, but that counter resets whenever the tool
//! restarts, so it is ignored here; sequence numbers are assigned by the
//! [`RingLog`](crate::ringlog::RingLog) at ingestion.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Current wire schema version. Lines without a `v` field are treated as
/// version 1; lines with a newer version are dropped rather than misparsed.
pub const WIRE_VERSION: u32 = 1;

/// One captured debug-output occurrence. Immutable once created; destroyed
/// only by eviction from the ring log.
#[derive(Debug, Clone, Serialize)]
pub struct DebugEvent {
    /// Strictly increasing, never reused, assigned at ingestion.
    pub seq: u64,
    /// Capture timestamp from the native tool (opaque high-resolution tick).
    pub time: u64,
    /// Source process id.
    pub pid: u32,
    /// Resolved process name, if the pid was resolvable at ingestion time.
    pub process_name: Option<String>,
    /// Raw debug text.
    pub text: String,
}

/// One line of capture-subprocess output, as emitted by the native tool.
#[derive(Debug, Deserialize)]
pub struct WireRecord {
    /// Schema version; absent means version 1.
    pub v: Option<u32>,
    /// The tool's own counter. Ignored, see module docs.
    #[allow(dead_code)]
    pub seq: Option<u64>,
    pub time: u64,
    pub pid: u32,
    /// Some capture tools resolve the name themselves; if absent the
    /// ingestion loop resolves it.
    pub process_name: Option<String>,
    pub text: String,
}

/// Parse one line of capture output. Fails on malformed JSON, missing
/// required fields, or an unsupported schema version; the caller drops the
/// line and keeps reading.
pub fn parse_line(line: &str) -> Result<WireRecord> {
    let record: WireRecord = serde_json::from_str(line)?;
    let version = record.v.unwrap_or(1);
    if version > WIRE_VERSION {
        bail!("unsupported wire version {}", version);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native_tool_line() {
        let rec = parse_line(r#"{"seq":0,"time":132500000000000000,"pid":1234,"text":"[TEST] hello"}"#)
            .unwrap();
        assert_eq!(rec.time, 132500000000000000);
        assert_eq!(rec.pid, 1234);
        assert_eq!(rec.text, "[TEST] hello");
        assert!(rec.process_name.is_none());
    }

    #[test]
    fn test_parse_with_process_name() {
        let rec =
            parse_line(r#"{"time":1,"pid":42,"process_name":"python.exe","text":"x"}"#).unwrap();
        assert_eq!(rec.process_name.as_deref(), Some("python.exe"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"time":1}"#).is_err());
        assert!(parse_line("").is_err());
    }

    #[test]
    fn test_parse_rejects_future_version() {
        assert!(parse_line(r#"{"v":2,"time":1,"pid":1,"text":"x"}"#).is_err());
        // v:1 is the current version and must parse.
        assert!(parse_line(r#"{"v":1,"time":1,"pid":1,"text":"x"}"#).is_ok());
    }
}
