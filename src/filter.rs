//! Per-event filter evaluation for sessions.
//!
//! A [`FilterSet`] is the compiled form of a [`FilterSpec`]; compilation is
//! eager so a session never holds a half-valid filter. Evaluation order:
//! exclude patterns dominate everything, include patterns are OR'd, then the
//! pid allowlist and process-name patterns are ANDed in. An empty set
//! matches every event.

use crate::event::DebugEvent;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// The caller-supplied filter dimensions, kept in their original string
/// form so status queries can render them back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub process_pids: Vec<u32>,
    #[serde(default)]
    pub process_names: Vec<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.process_pids.is_empty()
            && self.process_names.is_empty()
    }
}

/// A fully compiled filter bundle. Replaced wholesale on update, never
/// mutated in place.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    spec: FilterSpec,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    process_names: Vec<Regex>,
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect()
}

impl FilterSet {
    /// Compile every pattern in `spec`. Fails on the first invalid pattern
    /// without producing a partially compiled set.
    pub fn compile(spec: FilterSpec) -> Result<Self, regex::Error> {
        let include = compile_patterns(&spec.include)?;
        let exclude = compile_patterns(&spec.exclude)?;
        let process_names = compile_patterns(&spec.process_names)?;
        Ok(FilterSet {
            spec,
            include,
            exclude,
            process_names,
        })
    }

    /// The original pattern strings this set was compiled from.
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn matches(&self, event: &DebugEvent) -> bool {
        // Exclude dominates everything else.
        if self.exclude.iter().any(|re| re.is_match(&event.text)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(&event.text)) {
            return false;
        }
        if !self.spec.process_pids.is_empty() && !self.spec.process_pids.contains(&event.pid) {
            return false;
        }
        if !self.process_names.is_empty() {
            // An event with no resolved name always fails a name filter.
            let Some(name) = event.process_name.as_deref() else {
                return false;
            };
            if !self.process_names.iter().any(|re| re.is_match(name)) {
                return false;
            }
        }
        true
    }
}
