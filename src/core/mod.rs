//! Swipe decision logic and the storage operations it relies on.

/// Injected time source
pub mod clock;
/// The authorization engine
pub mod consume;
/// Order ledger and entitlement counter
pub mod ledger;
/// Per-key swipe serialization
pub mod lock;

pub use clock::{Clock, FixedClock, SystemClock};
pub use consume::{ConsumeEngine, ConsumeOutcome, OutcomeKind, SwipeRequest};
pub use lock::{SwipeKey, SwipeLocks};
