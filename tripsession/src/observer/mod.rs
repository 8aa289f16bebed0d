//! Observer registration and fan-out.
//!
//! Every event category the session exposes is an [`ObserverRegistry`]:
//! a subscriber list plus a cache of the last published value, which is
//! replayed to observers that register late.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tripsession::observer::ObserverRegistry;
//!
//! let registry = ObserverRegistry::new("speed");
//! registry.publish(42u32);
//!
//! // Late observer still sees the last value.
//! let subscription = Arc::new(registry).subscribe(Arc::new(|v: &u32| {
//!     assert_eq!(*v, 42);
//! }));
//! drop(subscription);
//! ```

mod hub;
mod registry;
mod subscription;

pub use hub::ObserverHub;
pub use registry::{DispatchLock, Observer, ObserverId, ObserverRef, ObserverRegistry};
pub use subscription::Subscription;
