//! WAMP routing: per-connection state, procedures and event fan-out.
//!
//! 1. **Prefixes** (`prefix`): per-connection CURIE tables and expansion
//! 2. **Subscriptions** (`subscription`): topic -> subscriber sets
//! 3. **Procedures** (`registry`): typed RPC handlers keyed by URI
//! 4. **Fan-out** (`fanout`): publish recipient resolution and delivery
//! 5. **Router** (`router`): decodes inbound frames and drives the above
//! 6. **Observers** (`observer`): notifications for the embedding application

pub mod config;
pub mod error;
pub mod fanout;
pub mod observer;
pub mod prefix;
pub mod registry;
pub mod router;
pub mod subscription;

// Re-export key types for convenient access.
pub use config::RouterConfig;
pub use error::{DispatchError, RouterError};
pub use fanout::{Audience, FanoutReport};
pub use observer::{CompositeObserver, RouterObserver};
pub use prefix::PrefixResolver;
pub use registry::{CallContext, CallRegistry};
pub use router::WampRouter;
pub use subscription::SubscriptionTable;
