//! Shared response caching with TTL and stale-while-revalidate semantics.
//!
//! The cache is a process-wide key→entry map ([`CacheStore`]) whose entries
//! carry their own freshness (`stale_time`) and lifetime (`ttl`) windows.
//! An expired entry is treated as absent on the next read; a stale-but-live
//! entry is served immediately while the reader schedules a background
//! revalidation. Server-side `Cache-Control` directives are reconciled with
//! caller-supplied timings by [`CacheControl`].

mod control;
mod entry;
mod store;

pub use control::{CacheControl, StorePolicy};
pub use entry::CacheEntry;
pub use store::{CacheEvent, CacheEventKind, CacheStore};
