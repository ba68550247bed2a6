//! Process enumeration, used by callers to discover pids and names when
//! building filters. Independent of the capture machinery.

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Enumerate running processes, optionally keeping only those whose name
/// contains `name_filter` (case-insensitive). Sorted by pid.
pub fn list_processes(name_filter: Option<&str>) -> Vec<ProcessInfo> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let needle = name_filter.map(|f| f.to_lowercase());
    let mut processes: Vec<ProcessInfo> = sys
        .processes()
        .iter()
        .map(|(pid, process)| ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
        })
        .filter(|info| match &needle {
            Some(needle) => info.name.to_lowercase().contains(needle),
            None => true,
        })
        .collect();
    processes.sort_by_key(|p| p.pid);
    processes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_processes_includes_self() {
        let procs = list_processes(None);
        assert!(!procs.is_empty());
        let me = std::process::id();
        assert!(procs.iter().any(|p| p.pid == me));
    }

    #[test]
    fn test_name_filter_is_substring_match() {
        let all = list_processes(None);
        let Some(sample) = all
            .iter()
            .find(|p| p.name.len() > 2 && p.name.is_char_boundary(2))
        else {
            return;
        };
        // Filter by an uppercased fragment of a known name; the match is
        // case-insensitive so the process must still be present.
        let fragment = sample.name[..2].to_uppercase();
        let filtered = list_processes(Some(&fragment));
        assert!(filtered.iter().any(|p| p.pid == sample.pid));
    }

    #[test]
    fn test_name_filter_can_exclude_everything() {
        let procs = list_processes(Some("no-such-process-name-zzz"));
        assert!(procs.is_empty());
    }
}
