//! The context threaded through every [`ExecOperator::next_batch`](super::ExecOperator::next_batch) call.

use tokio_util::sync::CancellationToken;

use crate::err::Error;

/// Per-execution state passed down the operator tree on every pull.
///
/// Cancellation is cooperative: leaf operators observe the token, while
/// intermediate operators simply propagate whatever error their inputs return.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
	/// Cancellation token for cooperative cancellation
	pub cancellation: CancellationToken,
}

impl ExecutionContext {
	pub fn new(cancellation: CancellationToken) -> Self {
		Self {
			cancellation,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancellation.is_cancelled()
	}

	/// Returns [`Error::QueryCancelled`] if this execution has been cancelled
	pub fn check_cancelled(&self) -> Result<(), Error> {
		if self.is_cancelled() {
			return Err(Error::QueryCancelled);
		}
		Ok(())
	}
}
