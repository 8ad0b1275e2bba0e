//! Durable storage backends.
//!
//! - **Memory Storage** - In-process map with change notifications
//! - **JSON File Storage** - Single JSON document on disk shared by every
//!   handle on the path, survives restarts

pub mod json_file;
pub mod memory;

// Re-exports
pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

/// Capacity of the change notification channels.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;
