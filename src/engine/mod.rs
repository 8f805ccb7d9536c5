//! Pure computation: pricing, availability, lifecycle transitions, winner draws.
//!
//! Nothing here performs I/O; the orchestration layer feeds snapshots in and
//! persists the results.

pub mod availability;
pub mod lifecycle;
pub mod pricing;
pub mod winner;

pub use availability::{partition_requested, Availability};
pub use lifecycle::{ensure_active, transition, LifecycleError, LifecycleEvent};
pub use pricing::{quote, PriceQuote, PricingError};
pub use winner::{draw, Draw, SeedSource, WinnerError, WinnerPolicy};
