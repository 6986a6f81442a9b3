//! Shared value types for Mirra's capture-and-retrieval engine.
//!
//! Every other crate in the workspace (`mirra-router`, `mirra-storage`,
//! `mirra-sse`, `mirra-proxy`) builds on the types defined here: a
//! [`Recording`] is the immutable snapshot of one proxied exchange, an
//! [`IndexEntry`] locates one recording inside the append-only file set,
//! and a [`SessionGroup`] buckets recordings that share an application
//! session.

mod headers;
mod id;
mod index;
mod provider;
mod recording;
mod session;

pub use headers::HeaderMap;
pub use id::{date_prefix, new_recording_id, prefix_of};
pub use index::IndexEntry;
pub use provider::Provider;
pub use recording::{Body, Recording, RequestRecord, ResponseRecord, Timing};
pub use session::{SessionGroup, SessionIndexFile, SESSION_INDEX_VERSION};
