//! Exception-retention policies.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pgas_place::PlaceId;
use serde::{Deserialize, Serialize};

use crate::TaskFailure;

/// Selects what a finish does with failures beyond reporting them at scope exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishKind {
	/// Failures are consumed by the scope that raises them.
	#[default]
	Default,
	/// Every failure any instance sees is also retained in its place's
	/// [`DiagnosticRegistry`] until dumped.
	Debug,
}

impl FinishKind {
	/// Configuration name of the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Default => "default",
			Self::Debug => "debug",
		}
	}

	/// Returns true when failures are retained for diagnostics.
	pub const fn retains(self) -> bool {
		matches!(self, Self::Debug)
	}
}

impl fmt::Display for FinishKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown [`FinishKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown finish kind `{0}` (expected `default` or `debug`)")]
pub struct ParseFinishKindError(pub String);

impl FromStr for FinishKind {
	type Err = ParseFinishKindError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"default" => Ok(Self::Default),
			"debug" => Ok(Self::Debug),
			_ => Err(ParseFinishKindError(s.to_string())),
		}
	}
}

/// Failures retained for one finish instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
	/// Instance label, `local finish@<serial>` or `global finish gid(N)`.
	pub finish: String,
	/// Failures in the order the instance saw them.
	pub failures: Vec<TaskFailure>,
}

/// Per-place record of every failure seen by debug finish instances.
///
/// Entries outlive the scopes that produced them and are removed only by
/// [`dump`](Self::dump), so failures swallowed by a hung or abandoned scope
/// can still be inspected.
#[derive(Debug)]
pub struct DiagnosticRegistry {
	here: PlaceId,
	entries: Mutex<IndexMap<u64, DiagnosticEntry>>,
}

impl DiagnosticRegistry {
	/// Creates an empty registry for `here`.
	pub fn new(here: PlaceId) -> Self {
		Self {
			here,
			entries: Mutex::new(IndexMap::new()),
		}
	}

	/// Appends `failure` to the entry of instance `serial`.
	///
	/// The label is refreshed on every record since an instance gains its
	/// global identity after its first failures may have been seen.
	pub fn record(&self, serial: u64, label: String, failure: TaskFailure) {
		let mut entries = self.entries.lock();
		let entry = entries.entry(serial).or_insert_with(|| DiagnosticEntry {
			finish: String::new(),
			failures: Vec::new(),
		});
		entry.finish = label;
		entry.failures.push(failure);
	}

	/// Removes and returns every retained entry, logging each failure.
	pub fn dump(&self) -> Vec<DiagnosticEntry> {
		let drained: Vec<DiagnosticEntry> = self.entries.lock().drain(..).map(|(_, entry)| entry).collect();
		for entry in &drained {
			for failure in &entry.failures {
				tracing::error!(place = %self.here, finish = %entry.finish, %failure, "finish.suppressed");
			}
		}
		drained
	}

	/// Returns true when no undumped failure is retained.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Number of instances with retained failures.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}
}

/// Retention policy resolved for one instance.
#[derive(Debug, Clone)]
pub(crate) enum Retention {
	Discard,
	Retain(Arc<DiagnosticRegistry>),
}

impl Retention {
	pub fn new(kind: FinishKind, registry: &Arc<DiagnosticRegistry>) -> Self {
		if kind.retains() {
			Self::Retain(Arc::clone(registry))
		} else {
			Self::Discard
		}
	}

	pub fn kind(&self) -> FinishKind {
		match self {
			Self::Discard => FinishKind::Default,
			Self::Retain(_) => FinishKind::Debug,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn kind_parses_case_insensitively() {
		assert_eq!("Debug".parse::<FinishKind>(), Ok(FinishKind::Debug));
		assert_eq!(" default ".parse::<FinishKind>(), Ok(FinishKind::Default));
		assert_eq!("strict".parse::<FinishKind>(), Err(ParseFinishKindError("strict".into())));
	}

	#[test]
	fn dump_drains_in_first_seen_order() {
		let registry = DiagnosticRegistry::new(PlaceId(1));
		registry.record(7, "local finish@7".into(), TaskFailure::new("error", "a", PlaceId(1)));
		registry.record(3, "local finish@3".into(), TaskFailure::new("error", "b", PlaceId(1)));
		registry.record(7, "global finish gid(4294967296)".into(), TaskFailure::new("panic", "c", PlaceId(1)));
		assert_eq!(registry.len(), 2);

		let dumped = registry.dump();
		assert_eq!(
			dumped.iter().map(|e| e.finish.as_str()).collect::<Vec<_>>(),
			vec!["global finish gid(4294967296)", "local finish@3"]
		);
		assert_eq!(dumped[0].failures.len(), 2);
		assert!(registry.is_empty());
		assert!(registry.dump().is_empty());
	}

	#[test]
	fn retention_follows_kind() {
		let registry = Arc::new(DiagnosticRegistry::new(PlaceId(0)));
		assert!(matches!(Retention::new(FinishKind::Default, &registry), Retention::Discard));
		assert_eq!(Retention::new(FinishKind::Debug, &registry).kind(), FinishKind::Debug);
	}
}
