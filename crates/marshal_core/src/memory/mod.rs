//! # Handles and Handle Pools
//!
//! Opaque resource handles and the storage that resolves them.
//!
//! ## Design Philosophy
//!
//! A [`Rid`] is safe to pass across threads: it is just a number. Only the
//! thread that owns the [`RidOwner`] can turn it back into a resource.
//! [`HandleCache`] keeps batches of fresh handles on the producer side so
//! that creating a resource does not cost a round trip to the worker.

mod cache;
mod handle;
mod owner;

pub use cache::{CacheStats, HandleCache};
pub use handle::Rid;
pub use owner::RidOwner;
