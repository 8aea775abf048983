use core::fmt;
use std::io::Error as IoError;

use bincode::Error as BincodeError;
use ext_sort::SortError;
use thiserror::Error;

/// An error originating from the execution of an operator tree.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// An allocation exceeded the budget of a memory monitor
	#[error(
		"The memory monitor '{monitor}' could not allocate {requested} bytes: limit of {limit} bytes exceeded"
	)]
	OutOfMemory {
		/// The name of the monitor which refused the allocation
		monitor: String,
		/// The number of bytes which were requested
		requested: usize,
		/// The budget of the monitor
		limit: usize,
	},

	/// The query did not execute, because it was cancelled
	#[error("The query was not executed because it was cancelled")]
	QueryCancelled,

	/// There was an internal error while executing an operator
	#[error("Internal database error: {0}")]
	Internal(String),

	/// The database encountered unreachable logic
	#[error("The database encountered unreachable logic: {0}")]
	Unreachable(String),

	/// Represents an underlying error while reading or writing spill files
	#[error("I/O error: {0}")]
	Io(#[from] IoError),

	/// Represents an error when encoding or decoding spilled values
	#[error("Value encoding error: {0}")]
	Encode(#[from] BincodeError),
}

impl Error {
	#[track_caller]
	pub fn unreachable<T: fmt::Display>(message: T) -> Error {
		let location = std::panic::Location::caller();
		let message = format!("{}:{}: {}", location.file(), location.line(), message);
		Error::Unreachable(message)
	}

	/// Check if this error was raised by a memory monitor refusing an allocation
	pub fn is_out_of_memory(&self) -> bool {
		matches!(self, Error::OutOfMemory { .. })
	}

	/// Returns the name of the memory monitor which raised this error, if any
	pub fn memory_monitor(&self) -> Option<&str> {
		match self {
			Error::OutOfMemory {
				monitor,
				..
			} => Some(monitor),
			_ => None,
		}
	}

	/// Check if this error is an out of memory error raised by the named monitor.
	///
	/// Monitor identities are compared for equality, so an out of memory error
	/// coming from any other monitor in the tree does not match.
	pub fn is_out_of_memory_for(&self, monitor: &str) -> bool {
		self.memory_monitor() == Some(monitor)
	}
}

impl<S, D, I> From<SortError<S, D, I>> for Error
where
	S: std::error::Error,
	D: std::error::Error,
	I: std::error::Error,
{
	fn from(e: SortError<S, D, I>) -> Error {
		Error::Internal(e.to_string())
	}
}

/// A specialized `Result` type for operator execution.
pub type Result<T, E = Error> = std::result::Result<T, E>;
