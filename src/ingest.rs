//! Capture subprocess ownership and the ingestion loop.
//!
//! A [`CaptureHandle`] owns exactly one capture subprocess and the
//! dedicated thread that blocks on its stdout, parsing wire lines into
//! events and appending them to the shared ring log. Malformed lines are
//! dropped and logged; the loop exits on end-of-stream, flipping the
//! running flag so the manager can report the crash and respawn on the
//! next lifecycle call.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::event;
use crate::ringlog::RingLog;

/// Resolves pid -> process name at ingestion time. Failed lookups are
/// cached too; a pid that exited before we saw its first line stays
/// unresolved for the lifetime of the capture.
struct NameResolver {
    sys: System,
    cache: HashMap<u32, Option<String>>,
}

impl NameResolver {
    fn new() -> Self {
        NameResolver {
            sys: System::new(),
            cache: HashMap::new(),
        }
    }

    fn resolve(&mut self, pid: u32) -> Option<String> {
        if let Some(name) = self.cache.get(&pid) {
            return name.clone();
        }
        let sys_pid = Pid::from_u32(pid);
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), false);
        let name = self
            .sys
            .process(sys_pid)
            .map(|p| p.name().to_string_lossy().into_owned());
        self.cache.insert(pid, name.clone());
        name
    }
}

/// A spawned capture subprocess plus its reader thread.
pub struct CaptureHandle {
    child: Child,
    reader: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Spawn the capture executable and the ingestion thread feeding `ring`.
    pub fn spawn(exe: &Path, args: &[String], ring: Arc<Mutex<RingLog>>) -> Result<Self> {
        if !exe.exists() {
            bail!("capture executable not found: {}", exe.display());
        }

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn capture subprocess {}", exe.display()))?;

        // Confirm the subprocess survived startup before declaring capture
        // running.
        if let Some(status) = child.try_wait()? {
            bail!("capture subprocess exited immediately with {}", status);
        }

        let stdout = child
            .stdout
            .take()
            .context("capture subprocess has no stdout")?;
        let running = Arc::new(AtomicBool::new(true));

        let flag = running.clone();
        let reader = std::thread::Builder::new()
            .name("dbgtap-ingest".to_string())
            .spawn(move || ingest_loop(stdout, ring, flag))?;

        tracing::info!("capture subprocess started: {}", exe.display());
        Ok(CaptureHandle {
            child,
            reader: Some(reader),
            running,
        })
    }

    /// Whether the ingestion loop is still consuming the subprocess's
    /// output. Flips false when the subprocess exits for any reason.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Terminate the subprocess and join the reader. Killing the child
    /// closes its stdout, so the reader hits end-of-stream and the join is
    /// bounded in practice.
    pub fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.running.store(false, Ordering::Release);
        tracing::info!("capture subprocess stopped");
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        // stop() detaches the reader handle; if the handle is dropped
        // without an explicit stop, still reap the child.
        if self.reader.is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn ingest_loop<R: std::io::Read>(stdout: R, ring: Arc<Mutex<RingLog>>, running: Arc<AtomicBool>) {
    let mut resolver = NameResolver::new();
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("capture stream read error: {err}");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }
        match event::parse_line(&line) {
            Ok(record) => {
                let name = record
                    .process_name
                    .clone()
                    .or_else(|| resolver.resolve(record.pid));
                let seq = ring
                    .lock()
                    .unwrap()
                    .append(record.time, record.pid, name, record.text);
                tracing::trace!("ingested event seq {seq} from pid {}", record.pid);
            }
            Err(err) => {
                // Local recovery: drop the line, keep the loop alive.
                tracing::debug!("dropping malformed capture line: {err}");
            }
        }
    }
    running.store(false, Ordering::Release);
    tracing::info!("capture stream ended");
}
