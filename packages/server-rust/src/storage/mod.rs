//! Entity storage for the `Tenantry` server.
//!
//! - [`MemoryStore`]: in-memory, `DashMap`-backed execution of every
//!   operation kind; the innermost service of the data pipeline
//! - [`EntityRepository`]: typed per-entity access through the full pipeline

pub mod memory;
pub mod repository;

pub use memory::{MemoryStore, ID_FIELD};
pub use repository::{EntityRepository, UpdateResult};
