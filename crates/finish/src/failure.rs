//! Transport-safe task failures.

use std::backtrace::BacktraceStatus;
use std::fmt;

use pgas_place::PlaceId;
use serde::{Deserialize, Serialize};

use crate::{Error, MultipleFailures, TransferError};

const KIND_ERROR: &str = "error";
const KIND_PANIC: &str = "panic";
const KIND_CODEC: &str = "codec";
const KIND_MULTIPLE: &str = "multiple";

/// One failure raised by a task body.
///
/// Owns everything needed to report the failure on another place: the
/// rendered message, an optional captured backtrace, the cause chain and
/// any failures captured by a nested scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
	kind: String,
	message: String,
	place: PlaceId,
	backtrace: Option<String>,
	cause: Option<Box<TaskFailure>>,
	/// `None` until a nested failure is attached.
	suppressed: Option<Vec<TaskFailure>>,
}

impl TaskFailure {
	/// Creates a failure with no cause and no nested failures.
	pub fn new(kind: impl Into<String>, message: impl Into<String>, place: PlaceId) -> Self {
		Self {
			kind: kind.into(),
			message: message.into(),
			place,
			backtrace: None,
			cause: None,
			suppressed: None,
		}
	}

	/// Captures an error returned by a task body.
	///
	/// The `source()` chain becomes the cause chain. An aggregate raised by a
	/// nested scope keeps its constituents as nested failures.
	pub fn from_error(err: &anyhow::Error, place: PlaceId) -> Self {
		let mut failure = Self::from_chain(err.chain(), place).unwrap_or_else(|| Self::new(KIND_ERROR, err.to_string(), place));
		let backtrace = err.backtrace();
		if backtrace.status() == BacktraceStatus::Captured {
			failure.backtrace = Some(backtrace.to_string());
		}
		failure
	}

	/// Captures a panic payload caught at a task boundary.
	pub fn from_panic(payload: &(dyn std::any::Any + Send), place: PlaceId) -> Self {
		let message = pgas_worker::panic_message(payload).unwrap_or_else(|| "task panicked with a non-string payload".to_string());
		Self::new(KIND_PANIC, message, place)
	}

	/// Records a failure to encode or decode a transported failure.
	pub fn codec(err: &TransferError, place: PlaceId) -> Self {
		Self::new(KIND_CODEC, err.to_string(), place)
	}

	fn from_chain<'a, I>(mut chain: I, place: PlaceId) -> Option<Self>
	where
		I: Iterator<Item = &'a (dyn std::error::Error + 'static)>,
	{
		let head = chain.next()?;
		let nested = head
			.downcast_ref::<MultipleFailures>()
			.or_else(|| head.downcast_ref::<Error>().and_then(Error::failures));

		// An aggregate's sources are its own constituents, already kept below.
		if let Some(aggregate) = nested {
			let mut failure = Self::new(KIND_MULTIPLE, aggregate.to_string(), place);
			for inner in aggregate.failures() {
				failure.add_suppressed(inner.clone());
			}
			return Some(failure);
		}

		let mut failure = Self::new(KIND_ERROR, head.to_string(), place);
		failure.cause = Self::from_chain(chain, place).map(Box::new);
		Some(failure)
	}

	/// Failure classification (`error`, `panic`, `codec`, `multiple`, or a caller-defined kind).
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// Rendered message of this link.
	pub fn message(&self) -> &str {
		&self.message
	}

	/// Place where the failure was raised.
	pub fn place(&self) -> PlaceId {
		self.place
	}

	/// Captured backtrace text, when the error carried one.
	pub fn backtrace(&self) -> Option<&str> {
		self.backtrace.as_deref()
	}

	/// Next link of the cause chain.
	pub fn cause(&self) -> Option<&TaskFailure> {
		self.cause.as_deref()
	}

	/// Failures captured by a nested scope.
	pub fn suppressed(&self) -> &[TaskFailure] {
		self.suppressed.as_deref().unwrap_or_default()
	}

	/// Iterates this failure and its causes, outermost first.
	pub fn chain(&self) -> impl Iterator<Item = &TaskFailure> {
		std::iter::successors(Some(self), |f| f.cause())
	}

	/// Sets the cause of this failure.
	pub fn with_cause(mut self, cause: TaskFailure) -> Self {
		self.cause = Some(Box::new(cause));
		self
	}

	/// Attaches a nested failure.
	pub fn add_suppressed(&mut self, failure: TaskFailure) {
		self.suppressed.get_or_insert_with(Vec::new).push(failure);
	}

	/// Puts the failure in its canonical form before it crosses a place boundary.
	///
	/// Empty nested-failure lists collapse to the unset marker, recursively
	/// through the cause chain and every nested failure, so the decoded value
	/// never carries a half-initialized list.
	pub fn normalize(&mut self) {
		if self.suppressed.as_ref().is_some_and(Vec::is_empty) {
			self.suppressed = None;
		}
		for nested in self.suppressed.iter_mut().flatten() {
			nested.normalize();
		}
		if let Some(cause) = self.cause.as_deref_mut() {
			cause.normalize();
		}
	}

	/// Normalizes and encodes this failure for transport.
	pub fn encode(&self) -> Result<Vec<u8>, TransferError> {
		let mut wire = self.clone();
		wire.normalize();
		Ok(postcard::to_stdvec(&wire)?)
	}

	/// Decodes a transported failure.
	pub fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
		let mut failure: Self = postcard::from_bytes(bytes)?;
		failure.normalize();
		Ok(failure)
	}
}

impl fmt::Display for TaskFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} at {}: {}", self.kind, self.place, self.message)
	}
}

impl std::error::Error for TaskFailure {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Context as _;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn error_chain_becomes_cause_chain() {
		let err = anyhow::anyhow!("disk full").context("writing block").context("checkpoint failed");
		let failure = TaskFailure::from_error(&err, PlaceId(2));

		let messages: Vec<_> = failure.chain().map(TaskFailure::message).collect();
		assert_eq!(messages, vec!["checkpoint failed", "writing block", "disk full"]);
		assert!(failure.chain().all(|f| f.place() == PlaceId(2)));
	}

	#[test]
	fn nested_aggregate_keeps_constituents() {
		let inner = MultipleFailures::new(vec![
			TaskFailure::new("error", "a", PlaceId(1)),
			TaskFailure::new("panic", "b", PlaceId(3)),
		]);
		let err = anyhow::Error::new(Error::Multiple(inner.clone())).context("inner scope");
		let failure = TaskFailure::from_error(&err, PlaceId(0));

		assert_eq!(failure.kind(), "error");
		let nested = failure.cause().expect("aggregate is the cause");
		assert_eq!(nested.kind(), "multiple");
		assert_eq!(nested.suppressed(), inner.failures());
		assert!(nested.cause().is_none());
	}

	#[test]
	fn panic_payload_is_captured() {
		let payload = std::panic::catch_unwind(|| -> u8 { panic!("exploded") }).unwrap_err();
		let failure = TaskFailure::from_panic(&*payload, PlaceId(1));
		assert_eq!(failure.kind(), "panic");
		assert_eq!(failure.message(), "exploded");
	}

	#[test]
	fn normalize_collapses_empty_lists_recursively() {
		let mut cause = TaskFailure::new("error", "cause", PlaceId(0));
		cause.suppressed = Some(Vec::new());
		let mut nested = TaskFailure::new("error", "nested", PlaceId(0));
		nested.suppressed = Some(Vec::new());

		let mut failure = TaskFailure::new("error", "top", PlaceId(0)).with_cause(cause);
		failure.add_suppressed(nested);
		failure.normalize();

		assert!(failure.cause().unwrap().suppressed.is_none());
		assert!(failure.suppressed()[0].suppressed.is_none());
		assert_eq!(failure.suppressed().len(), 1);
	}

	#[test]
	fn transported_failure_matches_original() {
		let mut failure = TaskFailure::new("error", "remote boom", PlaceId(3)).with_cause(TaskFailure::new("error", "io", PlaceId(3)));
		failure.add_suppressed(TaskFailure::new("panic", "inner", PlaceId(1)));

		let decoded = TaskFailure::decode(&failure.encode().unwrap()).unwrap();
		assert_eq!(decoded, failure);
	}

	#[test]
	fn garbage_bytes_are_a_codec_error() {
		let err = TaskFailure::decode(&[0xff, 0xff, 0xff]).unwrap_err();
		assert!(matches!(err, TransferError::Codec(_)));
		assert_eq!(TaskFailure::codec(&err, PlaceId(0)).kind(), "codec");
	}
}
