use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::cnf::{BATCH_SIZE, SORT_MEMORY_LIMIT};
use crate::err::Error;
use crate::exec::operators::{DiskSpiller, ExternalSort};
use crate::exec::{
	BufferingOperator, ExecOperator, ExecutionContext, SharedOperator, ValueBatch, shared,
};
use crate::mem::{MemoryAccount, MemoryMonitor};
use crate::val::Value;

/// The direction in which the sort operators order their rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
	#[default]
	Asc,
	Desc,
}

impl SortOrder {
	/// Returns the comparison function for this order.
	pub fn comparator(self) -> fn(&Value, &Value) -> Ordering {
		match self {
			SortOrder::Asc => Value::cmp,
			SortOrder::Desc => |a, b| b.cmp(a),
		}
	}
}

impl fmt::Display for SortOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SortOrder::Asc => f.write_str("ASC"),
			SortOrder::Desc => f.write_str("DESC"),
		}
	}
}

/// In-memory sort operator - buffers its whole input before emitting it sorted.
///
/// Every buffered batch is registered against a [`MemoryAccount`]. Once the
/// monitor refuses an allocation the operator fails with an out of memory error,
/// keeping the batch it could not account for so that it can be exported along
/// with the rest of the backlog.
#[derive(Debug)]
pub struct MemorySort {
	input: SharedOperator,
	order: SortOrder,
	account: MemoryAccount,
	/// Input batches which have not been sorted yet
	buffered: VecDeque<ValueBatch>,
	/// The sorted rows still to be emitted, once the input is exhausted
	sorted: Option<std::vec::IntoIter<Value>>,
}

impl MemorySort {
	pub fn new(input: SharedOperator, account: MemoryAccount, order: SortOrder) -> Self {
		Self {
			input,
			order,
			account,
			buffered: VecDeque::new(),
			sorted: None,
		}
	}

	fn clear(&mut self) {
		self.buffered.clear();
		self.sorted = None;
		self.account.clear();
	}
}

impl ExecOperator for MemorySort {
	fn name(&self) -> &'static str {
		"MemorySort"
	}

	fn attrs(&self) -> Vec<(String, String)> {
		vec![
			("order".to_string(), self.order.to_string()),
			("monitor".to_string(), self.account.monitor().name().to_string()),
		]
	}

	fn prepare(&mut self) -> Result<(), Error> {
		self.input.lock().prepare()
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		if self.sorted.is_none() {
			loop {
				let batch = self.input.lock().next_batch(ctx)?;
				if batch.is_empty() {
					break;
				}
				let size = batch.mem_size();
				self.buffered.push_back(batch);
				self.account.grow(size)?;
			}
			let mut rows: Vec<Value> = self.buffered.drain(..).flat_map(|b| b.values).collect();
			rows.sort_by(self.order.comparator());
			self.sorted = Some(rows.into_iter());
		}
		ctx.check_cancelled()?;
		let rows: Vec<Value> = match self.sorted.as_mut() {
			Some(sorted) => sorted.take(*BATCH_SIZE).collect(),
			None => Vec::new(),
		};
		Ok(ValueBatch::from(rows))
	}

	fn reset(&mut self) {
		self.input.lock().reset();
		self.clear();
	}

	fn release(&mut self) -> Result<(), Error> {
		self.clear();
		Ok(())
	}

	fn child_count(&self, _verbose: bool) -> usize {
		1
	}

	fn child(&self, nth: usize, _verbose: bool) -> Option<SharedOperator> {
		(nth == 0).then(|| Arc::clone(&self.input))
	}
}

impl BufferingOperator for MemorySort {
	fn export_buffered(&mut self, _successor: &SharedOperator) -> Result<ValueBatch, Error> {
		match self.buffered.pop_front() {
			Some(batch) => {
				self.account.shrink(batch.mem_size());
				Ok(batch)
			}
			None => Ok(ValueBatch::empty()),
		}
	}
}

/// Creates a memory monitor with the configured sort budget.
pub fn sort_monitor(name: impl Into<String>) -> Arc<MemoryMonitor> {
	MemoryMonitor::new(name, *SORT_MEMORY_LIMIT)
}

/// Sorts `input` in memory under `monitor`, falling back to an [`ExternalSort`]
/// when the monitor budget is exceeded.
pub fn sort_with_spill(
	input: SharedOperator,
	monitor: &Arc<MemoryMonitor>,
	order: SortOrder,
) -> DiskSpiller<MemorySort> {
	let in_memory = shared(MemorySort::new(Arc::clone(&input), monitor.account(), order));
	DiskSpiller::single_input(input, in_memory, monitor.name(), |bridge| {
		shared(ExternalSort::new(bridge, order)) as SharedOperator
	})
}
