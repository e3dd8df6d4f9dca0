//! Storage and notification adapters.
//!
//! `MemoryStore` is always available. `PgStore` requires the `db-postgres`
//! feature.

pub mod broadcast;
pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use broadcast::BroadcastPublisher;
pub use memory::MemoryStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
