use crate::err::Error;
use crate::exec::{ExecOperator, ExecutionContext, ValueBatch};

/// Values operator - replays a fixed sequence of batches.
///
/// Used as a leaf of operator trees. It observes cancellation and can be
/// reset to replay its batches from the start.
#[derive(Debug, Clone, Default)]
pub struct ValuesSource {
	batches: Vec<ValueBatch>,
	pos: usize,
}

impl ValuesSource {
	pub fn new(batches: Vec<ValueBatch>) -> Self {
		Self {
			// Zero-length batches would terminate the sequence early
			batches: batches.into_iter().filter(|b| !b.is_empty()).collect(),
			pos: 0,
		}
	}

	/// Returns the number of batches which have not been emitted yet.
	pub fn remaining(&self) -> usize {
		self.batches.len() - self.pos
	}
}

impl ExecOperator for ValuesSource {
	fn name(&self) -> &'static str {
		"Values"
	}

	fn attrs(&self) -> Vec<(String, String)> {
		vec![("batches".to_string(), self.batches.len().to_string())]
	}

	fn prepare(&mut self) -> Result<(), Error> {
		Ok(())
	}

	fn next_batch(&mut self, ctx: &ExecutionContext) -> Result<ValueBatch, Error> {
		ctx.check_cancelled()?;
		match self.batches.get(self.pos) {
			Some(batch) => {
				self.pos += 1;
				Ok(batch.clone())
			}
			None => Ok(ValueBatch::empty()),
		}
	}

	fn reset(&mut self) {
		self.pos = 0;
	}
}
