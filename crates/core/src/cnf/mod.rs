use std::path::PathBuf;
use std::sync::LazyLock;

/// The maximum number of rows emitted in a single batch by the sort operators.
pub static BATCH_SIZE: LazyLock<usize> = lazy_env_parse!("DISKSPILL_BATCH_SIZE", usize, 1024);

/// Specifies the buffer limit for external sorting.
/// If the environment variable is not present or cannot be parsed, a default value of 50,000 is used.
pub static EXTERNAL_SORTING_BUFFER_LIMIT: LazyLock<usize> =
	lazy_env_parse!("DISKSPILL_EXTERNAL_SORTING_BUFFER_LIMIT", usize, 50_000);

/// The directory in which spill files are created. Falls back to the OS temporary directory.
pub static TEMPORARY_DIRECTORY: LazyLock<Option<String>> =
	lazy_env_parse!("DISKSPILL_TEMPORARY_DIRECTORY", Option<String>);

/// The default memory budget (in bytes) of an in-memory sort before it spills to disk.
pub static SORT_MEMORY_LIMIT: LazyLock<usize> =
	lazy_env_parse!("DISKSPILL_SORT_MEMORY_LIMIT", usize, 64 * 1024 * 1024);

/// Returns the directory in which spill files should be created.
pub fn temporary_directory() -> PathBuf {
	match TEMPORARY_DIRECTORY.as_deref() {
		Some(dir) if !dir.is_empty() => PathBuf::from(dir),
		_ => std::env::temp_dir(),
	}
}
