/// Trace label for where a piece of dispatch work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Short latency-sensitive async work such as timer expiry handlers.
	Interactive,
	/// Housekeeping async work that may wait, such as deferred cleanup.
	Background,
	/// Blocking work executed on the blocking pool (runner match calls).
	Blocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Blocking => "blocking",
		}
	}
}
