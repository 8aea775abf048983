use std::sync::Arc;

use parking_lot::Mutex;

use crate::err::Error;
use crate::exec::{BufferingOperator, ExecOperator, ExecutionContext, SharedOperator, ValueBatch};

/// Buffer export operator - the input of a disk-backed operator after a spill.
///
/// First replays the batches the in-memory `source` had buffered but not yet
/// processed, then permanently switches over to pulling from `successor`, the
/// original input of the in-memory operator. No batch is duplicated or skipped,
/// as the successor resumes exactly where the in-memory operator stopped reading.
///
/// Both operators are expected to be prepared already: the source by the disk
/// spiller, and the successor transitively through the source.
#[derive(Debug)]
pub struct BufferExporter<M: BufferingOperator> {
	source: Arc<Mutex<M>>,
	successor: SharedOperator,
	/// Set once the source backlog has been fully exported
	source_done: bool,
}

impl<M: BufferingOperator> BufferExporter<M> {
	pub fn new(source: Arc<Mutex<M>>, successor: SharedOperator) -> Self {
		Self {
			source,
			successor,
			source_done: false,
		}
	}
}

impl<M: BufferingOperator> ExecOperator for BufferExporter<M> {
	fn name(&self) -> &'static str {
		"BufferExport"
	}

	fn prepare(&mut self) -> Result<(), Error> {
		Ok(())
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		if self.source_done {
			return self.successor.lock().next_batch(ctx);
		}
		let batch = self.source.lock().export_buffered(&self.successor)?;
		if !batch.is_empty() {
			return Ok(batch);
		}
		trace!("Buffered batches exported, forwarding from the original input");
		self.source_done = true;
		self.successor.lock().next_batch(ctx)
	}

	fn reset(&mut self) {
		self.source.lock().reset();
		self.successor.lock().reset();
		self.source_done = false;
	}
}
