/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// A task body running under a finish scope.
	Activity,
	/// Delivery of inter-place messages, applied in arrival order.
	Delivery,
}

impl TaskClass {
	/// Stable label used in log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Activity => "activity",
			Self::Delivery => "delivery",
		}
	}
}
