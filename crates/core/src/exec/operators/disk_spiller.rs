use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::err::Error;
use crate::exec::operators::BufferExporter;
use crate::exec::{
	BufferingOperator, ExecOperator, ExecutionContext, SharedOperator, ValueBatch, shared,
};

/// Whether a [`DiskSpiller`] has fallen back to its disk-backed operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpillState {
	#[default]
	Unspilled,
	Spilled,
}

/// Whether `prepare` has been called on one of the chains of a [`DiskSpiller`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum InitStatus {
	#[default]
	NotInitialized,
	Initialized,
	/// `prepare` was attempted and failed, possibly after partially running
	Failed,
}

/// Disk spiller operator - transparently falls back from an in-memory operator
/// to a disk-backed one when the former reaches its memory limit.
///
/// The components involved, for a single input, are as follows:
///
/// ```text
///         -------------  input  -----------
///        |                ||                | (2nd src)
///        |                ||   (1st src)    v
///        |            ----||---> BufferExporter
///        v           |    ||                |
///     in-memory -----     ||                v
///        |                ||           disk-backed
///        |                vv                |
///         --------->  DiskSpiller  <--------
///                         ||
///                         vv
///                       output
/// ```
///
/// - the main chain is input -> in-memory operator -> spiller -> output.
/// - each pull is first attempted on the in-memory operator. If it fails with an
///   out of memory error raised by the monitor named by this spiller, the
///   disk-backed chain is prepared and every pull from then on is served by it.
/// - the disk-backed chain is bridge -> disk-backed operator. The bridge first
///   exports the batches buffered by the in-memory operator, then proceeds to
///   emit from the input.
///
/// With two inputs there are two bridges, both exporting from the in-memory
/// operator but each forwarding from a different input.
///
/// Errors raised while preparing the in-memory operator, any error raised by the
/// disk-backed chain, and any out of memory error coming from another monitor
/// are propagated unchanged. The fallback happens at most once per run.
pub struct DiskSpiller<M: BufferingOperator> {
	inputs: Vec<SharedOperator>,
	state: SpillState,
	in_memory: Arc<Mutex<M>>,
	in_memory_status: InitStatus,
	monitor: String,
	disk_backed: SharedOperator,
	disk_backed_status: InitStatus,
	on_spill: Option<Box<dyn FnMut() + Send>>,
}

impl<M: BufferingOperator + 'static> DiskSpiller<M> {
	/// Creates a spiller for an in-memory operator consuming a single input.
	///
	/// The disk-backed operator is built by `disk_backed` from a bridge standing in
	/// for the input, so disk-backed implementations only ever see a plain input.
	/// Only out of memory errors raised by the monitor named `monitor` trigger the
	/// fallback.
	pub fn single_input<F>(
		input: SharedOperator,
		in_memory: Arc<Mutex<M>>,
		monitor: impl Into<String>,
		disk_backed: F,
	) -> Self
	where
		F: FnOnce(SharedOperator) -> SharedOperator,
	{
		let bridge = shared(BufferExporter::new(Arc::clone(&in_memory), Arc::clone(&input)));
		let disk_backed = disk_backed(bridge);
		Self::new(vec![input], in_memory, monitor.into(), disk_backed)
	}

	/// Creates a spiller for an in-memory operator consuming two inputs.
	///
	/// Two bridges are built, both exporting from the in-memory operator, the first
	/// forwarding from `left` and the second from `right`.
	pub fn dual_input<F>(
		left: SharedOperator,
		right: SharedOperator,
		in_memory: Arc<Mutex<M>>,
		monitor: impl Into<String>,
		disk_backed: F,
	) -> Self
	where
		F: FnOnce(SharedOperator, SharedOperator) -> SharedOperator,
	{
		let left_bridge = shared(BufferExporter::new(Arc::clone(&in_memory), Arc::clone(&left)));
		let right_bridge = shared(BufferExporter::new(Arc::clone(&in_memory), Arc::clone(&right)));
		let disk_backed = disk_backed(left_bridge, right_bridge);
		Self::new(vec![left, right], in_memory, monitor.into(), disk_backed)
	}

	fn new(
		inputs: Vec<SharedOperator>,
		in_memory: Arc<Mutex<M>>,
		monitor: String,
		disk_backed: SharedOperator,
	) -> Self {
		Self {
			inputs,
			state: SpillState::Unspilled,
			in_memory,
			in_memory_status: InitStatus::NotInitialized,
			monitor,
			disk_backed,
			disk_backed_status: InitStatus::NotInitialized,
			on_spill: None,
		}
	}
}

impl<M: BufferingOperator> DiskSpiller<M> {
	/// Sets a callback invoked when the fallback to disk happens.
	pub fn with_spill_callback(mut self, callback: impl FnMut() + Send + 'static) -> Self {
		self.on_spill = Some(Box::new(callback));
		self
	}

	pub fn state(&self) -> SpillState {
		self.state
	}

	pub fn is_spilled(&self) -> bool {
		self.state == SpillState::Spilled
	}

	/// The name of the memory monitor whose out of memory errors are recoverable
	pub fn monitor(&self) -> &str {
		&self.monitor
	}

	fn spill(&mut self, cause: &Error) -> Result<(), Error> {
		debug!("Falling back to disk for memory monitor '{}': {cause}", self.monitor);
		self.state = SpillState::Spilled;
		if let Some(callback) = self.on_spill.as_mut() {
			callback();
		}
		self.prepare_disk_backed()
	}

	fn prepare_disk_backed(&mut self) -> Result<(), Error> {
		let result = self.disk_backed.lock().prepare();
		self.disk_backed_status = match result {
			Ok(()) => InitStatus::Initialized,
			Err(_) => InitStatus::Failed,
		};
		result
	}
}

impl<M: BufferingOperator> fmt::Debug for DiskSpiller<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DiskSpiller")
			.field("inputs", &self.inputs.len())
			.field("state", &self.state)
			.field("in_memory_status", &self.in_memory_status)
			.field("monitor", &self.monitor)
			.field("disk_backed_status", &self.disk_backed_status)
			.finish()
	}
}

impl<M: BufferingOperator + 'static> ExecOperator for DiskSpiller<M> {
	fn name(&self) -> &'static str {
		"DiskSpiller"
	}

	fn attrs(&self) -> Vec<(String, String)> {
		vec![("monitor".to_string(), self.monitor.clone())]
	}

	fn prepare(&mut self) -> Result<(), Error> {
		if self.in_memory_status == InitStatus::Initialized {
			return Ok(());
		}
		// The inputs feed the in-memory operator, which prepares them itself.
		// Failures here are never recovered from, as nothing has been buffered yet.
		self.in_memory.lock().prepare()?;
		self.in_memory_status = InitStatus::Initialized;
		Ok(())
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		if self.state == SpillState::Spilled {
			// Never pull from a disk-backed operator whose prepare did not succeed
			if self.disk_backed_status != InitStatus::Initialized {
				self.prepare_disk_backed()?;
			}
			return self.disk_backed.lock().next_batch(ctx);
		}
		// The in-memory lock must be released before pulling through the bridges
		let result = self.in_memory.lock().next_batch(ctx);
		match result {
			Ok(batch) => Ok(batch),
			Err(e) if e.is_out_of_memory_for(&self.monitor) => {
				self.spill(&e)?;
				self.disk_backed.lock().next_batch(ctx)
			}
			Err(e) => Err(e),
		}
	}

	fn reset(&mut self) {
		// The inputs and the in-memory operator may be reset again through the
		// bridges and the in-memory operator itself. Every reset is idempotent.
		for input in &self.inputs {
			input.lock().reset();
		}
		if self.in_memory_status == InitStatus::Initialized {
			self.in_memory.lock().reset();
		}
		if self.disk_backed_status != InitStatus::NotInitialized {
			self.disk_backed.lock().reset();
		}
		self.in_memory_status = InitStatus::NotInitialized;
		self.disk_backed_status = InitStatus::NotInitialized;
		self.state = SpillState::Unspilled;
	}

	fn release(&mut self) -> Result<(), Error> {
		let disk_backed = self.disk_backed.lock().release();
		let in_memory = match self.in_memory_status {
			InitStatus::Initialized => self.in_memory.lock().release(),
			InitStatus::NotInitialized | InitStatus::Failed => Ok(()),
		};
		disk_backed.and(in_memory)
	}

	/// In verbose mode the in-memory operator is reported as child 0, followed by
	/// the inputs and then the disk-backed operator. This is for plan display only:
	/// at runtime the inputs feed the in-memory operator, not the spiller.
	fn child_count(&self, verbose: bool) -> usize {
		if verbose {
			return self.inputs.len() + 2;
		}
		1
	}

	fn child(&self, nth: usize, verbose: bool) -> Option<SharedOperator> {
		if nth == 0 {
			return Some(Arc::clone(&self.in_memory) as SharedOperator);
		}
		if !verbose {
			return None;
		}
		if nth == self.inputs.len() + 1 {
			return Some(Arc::clone(&self.disk_backed));
		}
		self.inputs.get(nth - 1).cloned()
	}
}
