use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Take, Write};
use std::sync::Arc;

use ext_sort::{ExternalChunk, ExternalSorter, ExternalSorterBuilder, LimitedBufferBuilder};
use tempfile::{Builder, TempDir};

use crate::cnf::{BATCH_SIZE, EXTERNAL_SORTING_BUFFER_LIMIT, temporary_directory};
use crate::err::Error;
use crate::exec::operators::SortOrder;
use crate::exec::{ExecOperator, ExecutionContext, SharedOperator, ValueBatch};
use crate::val::Value;

/// External sort operator - sorts its input using runs spilled to disk.
///
/// The whole input is consumed on the first pull. Rows are collected into
/// bounded in-memory buffers, each of which is sorted and written to a chunk file
/// in a temporary directory. The chunk files are then merged lazily as batches
/// are requested. The temporary directory is removed when the operator is reset,
/// released or dropped.
pub struct ExternalSort {
	input: SharedOperator,
	order: SortOrder,
	/// The maximum number of rows sorted in memory before a chunk is written
	buffer_limit: usize,
	runs: Option<SortedRuns>,
}

struct SortedRuns {
	merged: Box<dyn Iterator<Item = Result<Value, Error>> + Send>,
	// Owns the chunk files, so must outlive the merged chunk readers
	_sorter: ExternalSorter<Value, Error, LimitedBufferBuilder, ValueExternalChunk>,
	_dir: TempDir,
}

impl ExternalSort {
	const SORT_DIRECTORY_PREFIX: &'static str = "diskspill-sort";

	pub fn new(input: SharedOperator, order: SortOrder) -> Self {
		Self {
			input,
			order,
			buffer_limit: *EXTERNAL_SORTING_BUFFER_LIMIT,
			runs: None,
		}
	}

	/// Overrides the number of rows sorted in memory per chunk file.
	pub fn with_buffer_limit(mut self, limit: usize) -> Self {
		self.buffer_limit = limit.max(1);
		self
	}

	fn sort_input(&self, ctx: &ExecutionContext) -> Result<SortedRuns, Error> {
		let dir = Builder::new().prefix(Self::SORT_DIRECTORY_PREFIX).tempdir_in(temporary_directory())?;
		trace!("Sorting input externally in {}", dir.path().display());
		let sorter: ExternalSorter<Value, Error, LimitedBufferBuilder, ValueExternalChunk> =
			ExternalSorterBuilder::new()
				.with_tmp_dir(dir.path())
				.with_buffer(LimitedBufferBuilder::new(self.buffer_limit, true))
				.build()?;
		let mut rows = InputRows::new(&self.input, ctx);
		let merged = sorter.sort_by(&mut rows, self.order.comparator());
		// Errors raised by the input are reported as they are
		if let Some(e) = rows.failure.take() {
			return Err(e);
		}
		Ok(SortedRuns {
			merged: Box::new(merged?),
			_sorter: sorter,
			_dir: dir,
		})
	}
}

impl fmt::Debug for ExternalSort {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExternalSort")
			.field("input", &self.input)
			.field("order", &self.order)
			.field("buffer_limit", &self.buffer_limit)
			.field("sorted", &self.runs.is_some())
			.finish()
	}
}

impl ExecOperator for ExternalSort {
	fn name(&self) -> &'static str {
		"ExternalSort"
	}

	fn attrs(&self) -> Vec<(String, String)> {
		vec![("order".to_string(), self.order.to_string())]
	}

	fn prepare(&mut self) -> Result<(), Error> {
		self.input.lock().prepare()
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		ctx.check_cancelled()?;
		if self.runs.is_none() {
			self.runs = Some(self.sort_input(ctx)?);
		}
		let Some(runs) = self.runs.as_mut() else {
			fail!("External sort has no sorted runs to read from");
		};
		let mut rows = Vec::with_capacity(*BATCH_SIZE);
		for row in runs.merged.by_ref().take(*BATCH_SIZE) {
			rows.push(row?);
		}
		Ok(ValueBatch::from(rows))
	}

	fn reset(&mut self) {
		self.input.lock().reset();
		self.runs = None;
	}

	fn release(&mut self) -> Result<(), Error> {
		self.runs = None;
		Ok(())
	}

	fn child_count(&self, _verbose: bool) -> usize {
		1
	}

	fn child(&self, nth: usize, _verbose: bool) -> Option<SharedOperator> {
		(nth == 0).then(|| Arc::clone(&self.input))
	}
}

/// Adapts the batches of an operator into the row iterator consumed by the sorter.
///
/// The sorter would wrap input errors into its own error type, so the first
/// error is kept aside and the iteration simply ends.
struct InputRows<'a> {
	input: &'a SharedOperator,
	ctx: &'a ExecutionContext,
	batch: std::vec::IntoIter<Value>,
	failure: Option<Error>,
	done: bool,
}

impl<'a> InputRows<'a> {
	fn new(input: &'a SharedOperator, ctx: &'a ExecutionContext) -> Self {
		Self {
			input,
			ctx,
			batch: Vec::new().into_iter(),
			failure: None,
			done: false,
		}
	}
}

impl Iterator for InputRows<'_> {
	type Item = Result<Value, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(row) = self.batch.next() {
				return Some(Ok(row));
			}
			if self.done {
				return None;
			}
			let next = self.input.lock().next_batch(self.ctx);
			match next {
				Ok(batch) if batch.is_empty() => self.done = true,
				Ok(batch) => self.batch = batch.values.into_iter(),
				Err(e) => {
					self.failure = Some(e);
					self.done = true;
				}
			}
		}
	}
}

/// The number of bytes of the length prefix written before each value
const LENGTH_PREFIX_SIZE: usize = size_of::<u64>();

struct ValueExternalChunk {
	reader: Take<BufReader<File>>,
}

impl ValueExternalChunk {
	fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<(), Error> {
		let buf = bincode::serialize(value)?;
		writer.write_all(&(buf.len() as u64).to_be_bytes())?;
		writer.write_all(&buf)?;
		Ok(())
	}

	fn read_value<R: Read>(reader: &mut R) -> Result<Value, Error> {
		let mut len = [0u8; LENGTH_PREFIX_SIZE];
		reader.read_exact(&mut len)?;
		let mut buf = vec![0u8; u64::from_be_bytes(len) as usize];
		reader.read_exact(&mut buf)?;
		Ok(bincode::deserialize(&buf)?)
	}
}

impl ExternalChunk<Value> for ValueExternalChunk {
	type SerializationError = Error;
	type DeserializationError = Error;

	fn new(reader: Take<BufReader<File>>) -> Self {
		Self {
			reader,
		}
	}

	fn dump(
		chunk_writer: &mut BufWriter<File>,
		items: impl IntoIterator<Item = Value>,
	) -> Result<(), Self::SerializationError> {
		for item in items {
			Self::write_value(chunk_writer, &item)?;
		}
		Ok(())
	}
}

impl Iterator for ValueExternalChunk {
	type Item = Result<Value, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.reader.limit() == 0 {
			return None;
		}
		Some(Self::read_value(&mut self.reader))
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;
	use crate::exec::operators::ValuesSource;
	use crate::exec::operators::testing::{BufferingProbe, batches, drain, internal};
	use crate::exec::shared;

	#[rstest]
	#[case::single_chunk(SortOrder::Asc, 1_000)]
	#[case::many_chunks(SortOrder::Asc, 3)]
	#[case::many_chunks_desc(SortOrder::Desc, 4)]
	fn test_external_sort_merges_chunks(#[case] order: SortOrder, #[case] limit: usize) {
		let ctx = ExecutionContext::default();
		let input: SharedOperator =
			shared(ValuesSource::new(batches(&[&[9, 4, 7], &[1, 8], &[3, 6, 2, 5], &[0]])));
		let sort: SharedOperator = shared(ExternalSort::new(input, order).with_buffer_limit(limit));
		sort.lock().prepare().unwrap();
		let output: Vec<i64> = drain(&sort, &ctx).unwrap().into_iter().flatten().collect();
		let expected: Vec<i64> = match order {
			SortOrder::Asc => (0..10).collect(),
			SortOrder::Desc => (0..10).rev().collect(),
		};
		assert_eq!(output, expected);
	}

	#[test_log::test]
	fn test_external_sort_reset_sorts_again() {
		let ctx = ExecutionContext::default();
		let input: SharedOperator = shared(ValuesSource::new(batches(&[&[2], &[1]])));
		let sort: SharedOperator =
			shared(ExternalSort::new(input.clone(), SortOrder::Asc).with_buffer_limit(1));
		assert_eq!(drain(&sort, &ctx).unwrap(), vec![vec![1, 2]]);
		sort.lock().reset();
		input.lock().reset();
		assert_eq!(drain(&sort, &ctx).unwrap(), vec![vec![1, 2]]);
		sort.lock().release().unwrap();
		sort.lock().release().unwrap();
	}

	#[test_log::test]
	fn test_external_sort_reports_input_errors() {
		let ctx = ExecutionContext::default();
		let values: SharedOperator = shared(ValuesSource::new(batches(&[&[1]])));
		let input: SharedOperator =
			shared(BufferingProbe::new(vec![values]).fail_on(1, || internal("input failed")));
		let mut sort = ExternalSort::new(input, SortOrder::Asc);
		let err = sort.next_batch(&ctx).unwrap_err();
		assert_eq!(err.to_string(), internal("input failed").to_string());
	}

	#[test_log::test]
	fn test_external_sort_observes_cancellation() {
		let ctx = ExecutionContext::default();
		let input: SharedOperator = shared(ValuesSource::new(batches(&[&[1]])));
		let mut sort = ExternalSort::new(input, SortOrder::Asc);
		ctx.cancellation.cancel();
		assert!(matches!(sort.next_batch(&ctx), Err(Error::QueryCancelled)));
	}
}
