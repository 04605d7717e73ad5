//! Graph-State: checkpoint and memory-store contracts for agent graphs
//!
//! A compiled agent graph persists its per-thread execution state through a
//! [`Checkpointer`] and, for memory-enabled variants, reads and writes
//! long-lived facts through a [`MemoryStore`].
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: thread isolation. A fresh `MemorySaver` / `InMemoryStore` pair
//! per evaluation case guarantees cases never observe each other's state.

mod error;
pub mod memory;
pub mod storage_traits;

pub use error::{StateError, StateResult};
pub use memory::{InMemoryStore, MemorySaver};
pub use storage_traits::{Checkpoint, Checkpointer, MemoryStore, Namespace, StoreItem, ThreadId};
