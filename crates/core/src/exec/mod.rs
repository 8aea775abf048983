//! Pull-based, batched operator contracts.
//!
//! Every node of an operator tree implements [`ExecOperator`]. A single consumer
//! drives the tree by calling [`ExecOperator::next_batch`] repeatedly on the root,
//! each call synchronously recursing through the operators below it. A batch of
//! length zero signals that an operator is exhausted.
//!
//! Operators which buffer their input in memory and are able to hand that backlog
//! over to a disk-backed replacement additionally implement [`BufferingOperator`].

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::err::Error;
use crate::val::Value;

pub mod context;
pub mod explain;
pub mod operators;

pub use context::ExecutionContext;
pub use explain::format_plan;

/// A chunk of rows passed between operators.
///
/// Batches are owned by the caller once returned, so no batch is ever
/// invalidated by a subsequent call on the operator which produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueBatch {
	pub values: Vec<Value>,
}

impl ValueBatch {
	/// Returns the zero-length batch which marks an exhausted operator.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	/// Returns an estimate of the number of bytes held by this batch.
	pub fn mem_size(&self) -> usize {
		self.values.iter().map(Value::mem_size).sum()
	}
}

impl From<Vec<Value>> for ValueBatch {
	fn from(values: Vec<Value>) -> Self {
		Self {
			values,
		}
	}
}

/// A handle onto an operator which can be shared between several parents.
///
/// The in-memory operator of a disk spiller, for instance, is driven by the
/// spiller and drained by the bridges in front of the disk-backed operator.
pub type SharedOperator = Arc<Mutex<dyn ExecOperator>>;

/// Wraps an operator into a [`SharedOperator`] handle.
pub fn shared<T: ExecOperator + 'static>(op: T) -> Arc<Mutex<T>> {
	Arc::new(Mutex::new(op))
}

/// Check whether two handles point to the same operator instance.
pub fn same_operator(a: &SharedOperator, b: &SharedOperator) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// The base pull abstraction implemented by every node of an operator tree.
pub trait ExecOperator: Debug + Send {
	/// The name of this operator, as displayed in plans.
	fn name(&self) -> &'static str;

	/// Key-value properties displayed next to the operator name in plans.
	fn attrs(&self) -> Vec<(String, String)> {
		vec![]
	}

	/// Prepares this operator, and the inputs it owns, for execution.
	fn prepare(&mut self) -> Result<(), Error>;

	/// Produces the next batch, or a zero-length batch once exhausted.
	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error>;

	/// Returns the operator to the state it had before [`ExecOperator::prepare`]
	/// so that the tree can be run again. Stateless operators need not override this.
	fn reset(&mut self) {}

	/// Frees any resources held by this operator. Must be idempotent.
	fn release(&mut self) -> Result<(), Error> {
		Ok(())
	}

	/// The number of children reported to plan explain output.
	fn child_count(&self, _verbose: bool) -> usize {
		0
	}

	/// The `nth` child reported to plan explain output.
	fn child(&self, _nth: usize, _verbose: bool) -> Option<SharedOperator> {
		None
	}
}

/// An operator which buffers intermediate batches in memory and can export the
/// batches it has not processed yet once its memory budget has been reached.
pub trait BufferingOperator: ExecOperator {
	/// Returns the oldest buffered batch which has not yet been emitted.
	///
	/// The `successor` is the operator whose batches will follow the exported ones,
	/// which for operators with several inputs identifies which backlog to drain.
	/// It is never pulled from. Once the backlog is empty, this returns a zero-length
	/// batch on this and every subsequent call.
	fn export_buffered(&mut self, successor: &SharedOperator) -> Result<ValueBatch, Error>;
}
