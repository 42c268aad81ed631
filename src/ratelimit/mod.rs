//! Rate limiting logic: tiers, caller classification and the sliding window.

mod classifier;
mod clock;
mod gate;
mod key;
mod policy;
mod window;

pub use classifier::{ClientIdentity, IdentityClassifier, PlanDirectory, StaticDirectory};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{denial_reason, FailOpenCause, RateLimitGate, StoreStatus, Verdict};
pub use key::{WindowKey, WindowKeyBuilder};
pub use policy::{Tier, TierPolicy};
pub use window::{AdmitMode, Decision, SlidingWindowCounter};
