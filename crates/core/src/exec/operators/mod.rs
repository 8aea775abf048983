//! Physical operators.
//!
//! - [`DiskSpiller`] - falls back from an in-memory operator to a disk-backed one
//! - [`BufferExporter`] - replays a buffering operator's backlog, then forwards its input
//! - [`MemorySort`] / [`ExternalSort`] - in-memory and disk-backed sorting
//! - [`ValuesSource`] - replays a fixed sequence of batches

mod buffer_export;
mod disk_spiller;
mod external_sort;
mod sort;
mod values;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer_export::BufferExporter;
pub use disk_spiller::{DiskSpiller, SpillState};
pub use external_sort::ExternalSort;
pub use sort::{MemorySort, SortOrder, sort_monitor, sort_with_spill};
pub use values::ValuesSource;
