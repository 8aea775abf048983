//! Operators and helpers shared by the operator tests.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::err::Error;
use crate::exec::{
	BufferingOperator, ExecOperator, ExecutionContext, SharedOperator, ValueBatch, same_operator,
};
use crate::mem::{MemoryAccount, MemoryMonitor};
use crate::val::Value;

/// Builds one batch of integers per slice.
pub(crate) fn batches(rows: &[&[i64]]) -> Vec<ValueBatch> {
	rows.iter().map(|r| ValueBatch::from(r.iter().copied().map(Value::Int).collect::<Vec<_>>())).collect()
}

pub(crate) fn int(v: &Value) -> i64 {
	match v {
		Value::Int(i) => *i,
		v => panic!("expected an integer, found {v}"),
	}
}

pub(crate) fn values_of(batch: &ValueBatch) -> Vec<i64> {
	batch.values.iter().map(int).collect()
}

/// Pulls from `op` until it is exhausted, collecting every batch.
pub(crate) fn drain(op: &SharedOperator, ctx: &ExecutionContext) -> Result<Vec<Vec<i64>>, Error> {
	let mut out = Vec::new();
	loop {
		let batch = op.lock().next_batch(ctx)?;
		if batch.is_empty() {
			return Ok(out);
		}
		out.push(values_of(&batch));
	}
}

pub(crate) fn oom(monitor: &str) -> Error {
	Error::OutOfMemory {
		monitor: monitor.to_string(),
		requested: 64,
		limit: 32,
	}
}

pub(crate) fn internal(message: &str) -> Error {
	Error::Internal(message.to_string())
}

/// A buffering operator which reads all of its inputs, in order, before
/// emitting the buffered batches unchanged.
///
/// Every batch is buffered before its size is registered, so the batch which
/// exceeded the memory budget is part of the exported backlog. The probe counts
/// the calls it receives, and can be made to fail on a given `next_batch` call.
#[derive(Debug, Default)]
pub(crate) struct BufferingProbe {
	inputs: Vec<SharedOperator>,
	account: Option<MemoryAccount>,
	buffered: VecDeque<(usize, ValueBatch)>,
	current: usize,
	draining: bool,
	/// Fails the nth `next_batch` call with the given error
	pub fail_on: Option<(usize, fn() -> Error)>,
	pub fail_prepare: Option<fn() -> Error>,
	pub prepare_calls: usize,
	pub next_calls: usize,
	pub export_calls: usize,
	pub resets: usize,
	pub releases: usize,
}

impl BufferingProbe {
	pub(crate) fn new(inputs: Vec<SharedOperator>) -> Self {
		Self::default().with_inputs(inputs)
	}

	pub(crate) fn with_inputs(mut self, inputs: Vec<SharedOperator>) -> Self {
		self.inputs = inputs;
		self
	}

	pub(crate) fn with_monitor(mut self, monitor: &Arc<MemoryMonitor>) -> Self {
		self.account = Some(monitor.account());
		self
	}

	pub(crate) fn fail_on(mut self, call: usize, err: fn() -> Error) -> Self {
		self.fail_on = Some((call, err));
		self
	}

	pub(crate) fn fail_prepare(mut self, err: fn() -> Error) -> Self {
		self.fail_prepare = Some(err);
		self
	}

	/// Buffers up to `count` batches, returning `false` once every input is exhausted.
	pub(crate) fn buffer_from_inputs(&mut self, ctx: &ExecutionContext, count: usize) -> Result<bool, Error> {
		for _ in 0..count {
			if !self.buffer_one(ctx)? {
				return Ok(false);
			}
		}
		Ok(true)
	}

	fn buffer_one(&mut self, ctx: &ExecutionContext) -> Result<bool, Error> {
		while let Some(input) = self.inputs.get(self.current) {
			let batch = input.lock().next_batch(ctx)?;
			if batch.is_empty() {
				self.current += 1;
				continue;
			}
			let size = batch.mem_size();
			self.buffered.push_back((self.current, batch));
			if let Some(account) = self.account.as_mut() {
				account.grow(size)?;
			}
			return Ok(true);
		}
		Ok(false)
	}

	fn pop(&mut self, index: Option<usize>) -> ValueBatch {
		let pos = match index {
			Some(index) => self.buffered.iter().position(|(i, _)| *i == index),
			None if self.buffered.is_empty() => None,
			None => Some(0),
		};
		match pos.and_then(|pos| self.buffered.remove(pos)) {
			Some((_, batch)) => {
				if let Some(account) = self.account.as_mut() {
					account.shrink(batch.mem_size());
				}
				batch
			}
			None => ValueBatch::empty(),
		}
	}
}

impl ExecOperator for BufferingProbe {
	fn name(&self) -> &'static str {
		"BufferingProbe"
	}

	fn prepare(&mut self) -> Result<(), Error> {
		self.prepare_calls += 1;
		if let Some(err) = self.fail_prepare {
			return Err(err());
		}
		for input in &self.inputs {
			input.lock().prepare()?;
		}
		Ok(())
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		self.next_calls += 1;
		if let Some((call, err)) = self.fail_on {
			if call == self.next_calls {
				return Err(err());
			}
		}
		if !self.draining {
			while self.buffer_one(ctx)? {}
			self.draining = true;
		}
		Ok(self.pop(None))
	}

	fn reset(&mut self) {
		self.buffered.clear();
		self.current = 0;
		self.draining = false;
		if let Some(account) = self.account.as_mut() {
			account.clear();
		}
		self.resets += 1;
	}

	fn release(&mut self) -> Result<(), Error> {
		self.buffered.clear();
		if let Some(account) = self.account.as_mut() {
			account.clear();
		}
		self.releases += 1;
		Ok(())
	}

	fn child_count(&self, _verbose: bool) -> usize {
		self.inputs.len()
	}

	fn child(&self, nth: usize, _verbose: bool) -> Option<SharedOperator> {
		self.inputs.get(nth).cloned()
	}
}

impl BufferingOperator for BufferingProbe {
	fn export_buffered(&mut self, successor: &SharedOperator) -> Result<ValueBatch, Error> {
		self.export_calls += 1;
		let Some(index) = self.inputs.iter().position(|i| same_operator(i, successor)) else {
			return Err(Error::unreachable("export requested for an operator which is not an input"));
		};
		Ok(self.pop(Some(index)))
	}
}

/// A disk-backed stand-in which emits each of its inputs in turn.
#[derive(Debug, Default)]
pub(crate) struct ConcatOperator {
	pub inputs: Vec<SharedOperator>,
	current: usize,
	/// Fails every `next_batch` call with the given error
	pub fail_next: Option<fn() -> Error>,
	/// Fails every `prepare` call with the given error
	pub fail_prepare: Option<fn() -> Error>,
	pub prepare_calls: usize,
	pub next_calls: usize,
	pub resets: usize,
	pub releases: usize,
}

impl ConcatOperator {
	pub(crate) fn new(inputs: Vec<SharedOperator>) -> Self {
		Self {
			inputs,
			..Default::default()
		}
	}
}

impl ExecOperator for ConcatOperator {
	fn name(&self) -> &'static str {
		"Concat"
	}

	fn prepare(&mut self) -> Result<(), Error> {
		self.prepare_calls += 1;
		if let Some(err) = self.fail_prepare {
			return Err(err());
		}
		for input in &self.inputs {
			input.lock().prepare()?;
		}
		Ok(())
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		self.next_calls += 1;
		if let Some(err) = self.fail_next {
			return Err(err());
		}
		while let Some(input) = self.inputs.get(self.current) {
			let batch = input.lock().next_batch(ctx)?;
			if !batch.is_empty() {
				return Ok(batch);
			}
			self.current += 1;
		}
		Ok(ValueBatch::empty())
	}

	fn reset(&mut self) {
		for input in &self.inputs {
			input.lock().reset();
		}
		self.current = 0;
		self.resets += 1;
	}

	fn release(&mut self) -> Result<(), Error> {
		self.releases += 1;
		Ok(())
	}

	fn child_count(&self, _verbose: bool) -> usize {
		self.inputs.len()
	}

	fn child(&self, nth: usize, _verbose: bool) -> Option<SharedOperator> {
		self.inputs.get(nth).cloned()
	}
}
