//! The engine's entities, rules and port definitions.
//!
//! Nothing in this crate performs I/O. Time comes in through [`Clock`],
//! persistence through the traits in [`ports`].

pub mod activity;
pub mod calendar;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;
pub mod policy;
pub mod ports;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, Result};
pub use events::DomainEvent;
pub use ids::*;
pub use models::*;
pub use policy::{Action, Actor, Capabilities};
pub use ports::*;
