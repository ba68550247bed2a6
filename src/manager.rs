//! The capture manager: the one orchestrator composing the ring log,
//! session registry, and capture subprocess.
//!
//! The hosting process constructs a single manager and hands it out by
//! `Arc`; there is no global. Locking discipline: the ring log (events +
//! sequence counter) has its own mutex, the registry another, and the
//! subprocess handle a third. No operation holds two of them at once.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::event::DebugEvent;
use crate::filter::{FilterSet, FilterSpec};
use crate::ingest::CaptureHandle;
use crate::proclist::{self, ProcessInfo};
use crate::ringlog::{RingLog, DEFAULT_CAPACITY};
use crate::session::SessionRegistry;

/// Default cap on events returned by one `get_output` call.
pub const DEFAULT_OUTPUT_LIMIT: usize = 100;

#[cfg(windows)]
const CAPTURE_EXE_NAME: &str = "dbgcapture.exe";
#[cfg(not(windows))]
const CAPTURE_EXE_NAME: &str = "dbgcapture";

/// Locate the capture executable: explicit env override first, then next to
/// our own binary.
fn default_capture_exe() -> PathBuf {
    if let Ok(path) = std::env::var("DBGTAP_CAPTURE_EXE") {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(CAPTURE_EXE_NAME)))
        .unwrap_or_else(|| PathBuf::from(CAPTURE_EXE_NAME))
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub capture_exe: PathBuf,
    /// Extra arguments passed to the capture executable.
    pub capture_args: Vec<String>,
    /// Ring log capacity, in events.
    pub capacity: usize,
    /// Capture from all login sessions (`--global`, needs elevation).
    pub global_scope: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            capture_exe: default_capture_exe(),
            capture_args: Vec::new(),
            capacity: DEFAULT_CAPACITY,
            global_scope: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub name: String,
    /// The filter set rendered back as its original pattern strings.
    pub filters: FilterSpec,
    pub cursor: u64,
    /// Buffered events newer than the cursor, pre-filter. An upper bound on
    /// unread backlog.
    pub pending_count: usize,
    pub capture_running: bool,
    /// Current ring log occupancy.
    pub total_buffered: usize,
    pub created_at: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub cursor: u64,
}

pub struct CaptureManager {
    config: CaptureConfig,
    ring: Arc<Mutex<RingLog>>,
    registry: Mutex<SessionRegistry>,
    capture: Mutex<Option<CaptureHandle>>,
}

impl CaptureManager {
    pub fn new(config: CaptureConfig) -> Self {
        CaptureManager {
            ring: Arc::new(Mutex::new(RingLog::new(config.capacity))),
            registry: Mutex::new(SessionRegistry::new()),
            capture: Mutex::new(None),
            config,
        }
    }

    /// Start the capture subprocess. Idempotent: a live capture is left
    /// alone; a dead handle (subprocess crashed) is reaped and respawned.
    pub fn start_capture(&self) -> Result<()> {
        let mut capture = self.capture.lock().unwrap();
        if capture.as_ref().is_some_and(|h| h.is_running()) {
            return Ok(());
        }
        if let Some(stale) = capture.take() {
            stale.stop();
        }

        let mut args = self.config.capture_args.clone();
        if self.config.global_scope {
            args.push("--global".to_string());
        }
        let handle = CaptureHandle::spawn(&self.config.capture_exe, &args, self.ring.clone())
            .context("capture unavailable")?;
        *capture = Some(handle);
        Ok(())
    }

    /// Stop the capture subprocess and join its reader. Idempotent.
    pub fn stop_capture(&self) {
        if let Some(handle) = self.capture.lock().unwrap().take() {
            handle.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    /// Create a session, lazily starting capture if it is not running.
    /// The new session's cursor starts at the current sequence counter, so
    /// it only observes events ingested after it joins.
    pub fn create_session(&self, name: Option<String>) -> Result<(String, bool)> {
        self.start_capture()?;
        let cursor = self.ring.lock().unwrap().current_seq();
        let id = self.registry.lock().unwrap().create(name, cursor);
        tracing::debug!("created session {id} at cursor {cursor}");
        Ok((id, self.is_running()))
    }

    /// Destroy a session. Capture keeps running even if this was the last
    /// session; stopping is an explicit, separate call.
    pub fn destroy_session(&self, id: &str) -> bool {
        self.registry.lock().unwrap().destroy(id)
    }

    /// Replace a session's filters. All patterns are compiled before any
    /// mutation: an invalid pattern fails the whole call and leaves the
    /// session's existing filters untouched. `Ok(false)` means no such
    /// session.
    pub fn set_filters(&self, id: &str, spec: FilterSpec) -> Result<bool> {
        let filters = FilterSet::compile(spec).context("invalid filter pattern")?;
        Ok(self.registry.lock().unwrap().set_filters(id, filters))
    }

    /// Read the next batch of events matching a session's filters.
    ///
    /// Scans up to `limit` buffered events past the cursor and returns the
    /// ones that match, advancing the cursor to the last event examined —
    /// filtered-out events are consumed too and never re-scanned. Returns
    /// `None` if the session does not exist.
    pub fn get_output(
        &self,
        id: &str,
        limit: Option<usize>,
    ) -> Option<(Vec<Arc<DebugEvent>>, u64)> {
        let limit = limit.unwrap_or(DEFAULT_OUTPUT_LIMIT).max(1);

        let (cursor, filters) = {
            let registry = self.registry.lock().unwrap();
            let session = registry.get(id)?;
            (session.cursor, session.filters.clone())
        };

        // Snapshot the slice under the ring lock, evaluate filters outside it.
        let slice = self.ring.lock().unwrap().read_since(cursor, limit);
        let matched: Vec<Arc<DebugEvent>> = slice
            .events
            .into_iter()
            .filter(|event| filters.matches(event))
            .collect();

        let mut registry = self.registry.lock().unwrap();
        if let Some(session) = registry.get_mut(id) {
            if slice.last_seq > session.cursor {
                session.cursor = slice.last_seq;
            }
        }
        Some((matched, slice.last_seq))
    }

    /// Jump a session's cursor to the current sequence counter, discarding
    /// visibility into everything buffered so far.
    pub fn clear_session(&self, id: &str) -> bool {
        let cursor = self.ring.lock().unwrap().current_seq();
        self.registry.lock().unwrap().clear(id, cursor)
    }

    pub fn get_session_status(&self, id: &str) -> Option<SessionStatus> {
        let capture_running = self.is_running();
        let registry = self.registry.lock().unwrap();
        let session = registry.get(id)?;
        let (pending_count, total_buffered) = {
            let ring = self.ring.lock().unwrap();
            (ring.pending_count(session.cursor), ring.len())
        };
        Some(SessionStatus {
            session_id: session.id.clone(),
            name: session.name.clone(),
            filters: session.filters.spec().clone(),
            cursor: session.cursor,
            pending_count,
            capture_running,
            total_buffered,
            created_at: session
                .created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        })
    }

    pub fn list_sessions(&self) -> (Vec<SessionSummary>, bool) {
        let registry = self.registry.lock().unwrap();
        let mut sessions: Vec<SessionSummary> = registry
            .iter()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                cursor: s.cursor,
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        drop(registry);
        (sessions, self.is_running())
    }

    pub fn list_processes(&self, name_filter: Option<&str>) -> Vec<ProcessInfo> {
        proclist::list_processes(name_filter)
    }
}
