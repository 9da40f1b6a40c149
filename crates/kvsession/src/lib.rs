//! Server-side sessions stored as expiring hashes in a Redis-like store.
//!
//! This crate provides:
//! - [`Session`]: named values attached to an opaque ID, JSON-encoded per field,
//!   with tracking of removals not yet written back
//! - [`Store`]: create, find, save (renewing the TTL) and delete sessions
//! - [`Backend`]: the few hash and expiration commands the store needs, with an
//!   in-process [`MemoryBackend`] and, behind the `redis` feature, a Redis one
//!
//! Each session is persisted as one hash keyed by its ID. Alongside the
//! caller's fields the hash holds a reserved field with the session's
//! validity in seconds, and the key expires that long after the last save.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use kvsession::{MemoryBackend, Store};
//!
//! let store = Store::new(MemoryBackend::new(), Duration::from_secs(600))?;
//!
//! let mut session = store.create("abc").await?;
//! session.add("name", "John")?;
//! store.save(&mut session).await?;
//!
//! let session = store.find("abc").await?;
//! let name: String = session.get("name")?;
//! ```

mod backend;
mod config;
mod error;
mod id;
mod session;
mod store;

pub use backend::{Backend, MemoryBackend};
#[cfg(feature = "redis")]
pub use backend::RedisBackend;
pub use config::{
    CollisionPolicy, ConfigError, DEFAULT_ID_LENGTH, DEFAULT_VALIDITY, MAX_VALIDITY_SECS, PASSWORD_ENV,
    RedisConfig, StoreConfig, load_config_file,
};
pub use error::{BackendError, BackendResult, Error, Operation, Result};
pub use id::{ID_ALPHABET, IdGenerator};
pub use session::{Session, VALIDITY_FIELD};
pub use store::Store;
