// # Built-in Providers
//
// In-process and JSON-file implementations of the provider traits.
// Cloud clients live outside this crate and plug in through the registry.

pub mod file;
pub mod memory;

pub use file::{FileInventory, FileInventoryFactory, FileZone, FileZoneFactory};
pub use memory::{MemoryInventory, MemoryInventoryFactory, MemoryZone, MemoryZoneFactory};
