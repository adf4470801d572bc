//! Implementations of the ports in `crate::ports`.

pub mod memory;
pub mod notifier;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use notifier::LogNotifier;
