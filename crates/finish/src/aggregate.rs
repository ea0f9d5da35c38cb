use std::fmt;

use crate::TaskFailure;

/// The single error raised by a finish scope whose tasks failed.
///
/// Holds every captured failure in capture order. By the time this is
/// raised the scope has fully terminated; it is not a retry signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleFailures {
	failures: Vec<TaskFailure>,
}

impl MultipleFailures {
	/// Wraps the failures collected by one scope.
	pub fn new(failures: Vec<TaskFailure>) -> Self {
		Self { failures }
	}

	/// Constituent failures in capture order.
	pub fn failures(&self) -> &[TaskFailure] {
		&self.failures
	}

	/// Number of constituents.
	pub fn len(&self) -> usize {
		self.failures.len()
	}

	/// Returns true when there is no constituent.
	pub fn is_empty(&self) -> bool {
		self.failures.is_empty()
	}
}

impl fmt::Display for MultipleFailures {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.failures.as_slice() {
			[] => write!(f, "finish completed with no failures"),
			[only] => write!(f, "1 task failed: {only}"),
			[first, rest @ ..] => write!(f, "{} tasks failed, first: {first}", rest.len() + 1),
		}
	}
}

impl std::error::Error for MultipleFailures {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.failures.first().map(|f| f as &(dyn std::error::Error + 'static))
	}
}

impl IntoIterator for MultipleFailures {
	type Item = TaskFailure;
	type IntoIter = std::vec::IntoIter<TaskFailure>;

	fn into_iter(self) -> Self::IntoIter {
		self.failures.into_iter()
	}
}
