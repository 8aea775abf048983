//! Memory accounting for in-memory operators.
//!
//! A [`MemoryMonitor`] tracks the bytes allocated under a named budget. Operators
//! hold a [`MemoryAccount`] onto a monitor and grow it as they buffer data. When an
//! allocation would take the monitor beyond its limit, the account returns an
//! [`Error::OutOfMemory`] carrying the monitor name, which is what a
//! [`DiskSpiller`](crate::exec::operators::DiskSpiller) matches against to decide
//! whether it may fall back to disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::err::Error;

/// A named memory budget shared by one or more [`MemoryAccount`]s.
#[derive(Debug)]
pub struct MemoryMonitor {
	name: String,
	/// The budget in bytes, where `0` means unlimited
	limit: usize,
	/// The number of bytes currently allocated under this monitor
	used: AtomicUsize,
}

impl MemoryMonitor {
	/// Creates a new monitor with the given name and budget.
	pub fn new(name: impl Into<String>, limit: usize) -> Arc<Self> {
		Arc::new(Self {
			name: name.into(),
			limit,
			used: AtomicUsize::new(0),
		})
	}

	/// Creates a new monitor without any budget.
	pub fn unlimited(name: impl Into<String>) -> Arc<Self> {
		Self::new(name, 0)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	/// Returns the number of bytes currently allocated under this monitor
	pub fn current_usage(&self) -> usize {
		self.used.load(Ordering::Acquire)
	}

	/// Creates a new, empty account against this monitor.
	pub fn account(self: &Arc<Self>) -> MemoryAccount {
		MemoryAccount {
			monitor: Arc::clone(self),
			allocated: 0,
		}
	}

	fn try_grow(&self, bytes: usize) -> Result<(), Error> {
		if self.limit == 0 {
			self.used.fetch_add(bytes, Ordering::AcqRel);
			return Ok(());
		}
		loop {
			let current = self.used.load(Ordering::Acquire);
			let next = current.saturating_add(bytes);
			if next > self.limit {
				trace!("Memory monitor '{}' refused {bytes} bytes ({current} in use)", self.name);
				return Err(Error::OutOfMemory {
					monitor: self.name.clone(),
					requested: bytes,
					limit: self.limit,
				});
			}
			if self
				.used
				.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
				.is_ok()
			{
				return Ok(());
			}
		}
	}

	fn shrink(&self, bytes: usize) {
		self.used.fetch_sub(bytes, Ordering::AcqRel);
	}
}

/// An operator's share of a [`MemoryMonitor`], released when dropped.
#[derive(Debug)]
pub struct MemoryAccount {
	monitor: Arc<MemoryMonitor>,
	allocated: usize,
}

impl MemoryAccount {
	/// Registers `bytes` more against the monitor, or fails without registering anything.
	pub fn grow(&mut self, bytes: usize) -> Result<(), Error> {
		self.monitor.try_grow(bytes)?;
		self.allocated += bytes;
		Ok(())
	}

	/// Returns up to `bytes` previously registered bytes to the monitor.
	pub fn shrink(&mut self, bytes: usize) {
		let bytes = bytes.min(self.allocated);
		self.monitor.shrink(bytes);
		self.allocated -= bytes;
	}

	/// Returns every byte registered by this account to the monitor.
	pub fn clear(&mut self) {
		self.shrink(self.allocated);
	}

	pub fn allocated(&self) -> usize {
		self.allocated
	}

	pub fn monitor(&self) -> &Arc<MemoryMonitor> {
		&self.monitor
	}
}

impl Drop for MemoryAccount {
	fn drop(&mut self) {
		self.clear();
	}
}
