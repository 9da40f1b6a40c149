//! Session lifecycle against a backing store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::Backend;
use crate::config::{CollisionPolicy, StoreConfig};
use crate::error::{Error, Operation, Result};
use crate::id::IdGenerator;
use crate::session::Session;

/// Creates, loads, saves and deletes sessions.
///
/// Each session is one hash keyed by its ID, with an expiration equal to
/// the session's validity. The store keeps no per-session state: every
/// call goes to the backend.
///
/// Multi-command operations (`create`, `save`) are not atomic. If a later
/// command fails, the effects of earlier ones stay in the backend.
pub struct Store<B: Backend> {
    backend: Arc<B>,
    config: StoreConfig,
    ids: Arc<IdGenerator>,
}

impl<B: Backend> Store<B> {
    /// Create a store whose sessions live for `validity` after their last save.
    pub fn new(backend: B, validity: Duration) -> Result<Self> {
        Self::with_config(backend, StoreConfig::new().with_validity(validity))
    }

    /// Create a store from a full configuration.
    pub fn with_config(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let ids = IdGenerator::new(config.id_length);

        Ok(Self {
            backend: Arc::new(backend),
            config,
            ids: Arc::new(ids),
        })
    }

    /// Replace the generator used by [`create_new`](Self::create_new).
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a session under `id` with the default validity.
    pub async fn create(&self, id: &str) -> Result<Session> {
        self.create_with_validity(id, self.config.validity).await
    }

    /// Create a session under `id` that lives for `validity` after each save.
    ///
    /// The record is written with its validity field and then given its
    /// expiration. Under [`CollisionPolicy::Reject`] an existing record
    /// makes this fail with [`Error::AlreadyExists`]; under
    /// [`CollisionPolicy::Overwrite`] it is deleted first, so none of its
    /// fields carry over.
    pub async fn create_with_validity(&self, id: &str, validity: Duration) -> Result<Session> {
        if id.is_empty() {
            return Err(Error::EmptyId);
        }
        let mut session = Session::new(id, validity)?;

        match self.config.collision_policy {
            CollisionPolicy::Reject => {
                let existing = self
                    .backend
                    .hgetall(id)
                    .await
                    .map_err(|e| Error::operation(Operation::CreateCheck, e))?;
                if !existing.is_empty() {
                    return Err(Error::AlreadyExists(id.to_string()));
                }
            }
            CollisionPolicy::Overwrite => {
                let replaced = self
                    .backend
                    .del(&[id.to_string()])
                    .await
                    .map_err(|e| Error::operation(Operation::CreateWrite, e))?;
                if replaced > 0 {
                    trace!(session_id = %id, "Replacing existing session");
                }
            }
        }

        self.backend
            .hset_multiple(id, session.fields())
            .await
            .map_err(|e| Error::operation(Operation::CreateWrite, e))?;
        self.backend
            .expire(id, validity)
            .await
            .map_err(|e| Error::operation(Operation::CreateWrite, e))?;
        session.mark_saved();

        debug!(
            session_id = %id,
            validity_secs = validity.as_secs(),
            "Session created"
        );

        Ok(session)
    }

    /// Create a session under a freshly generated ID with the default validity.
    pub async fn create_new(&self) -> Result<Session> {
        self.create_new_with_validity(self.config.validity).await
    }

    /// Create a session under a freshly generated ID.
    pub async fn create_new_with_validity(&self, validity: Duration) -> Result<Session> {
        let id = self.ids.generate();
        self.create_with_validity(&id, validity).await
    }

    /// Load the session stored under `id`.
    ///
    /// An empty result means the key never existed or has expired, and is
    /// reported as [`Error::NotFound`].
    pub async fn find(&self, id: &str) -> Result<Session> {
        let fields = self
            .backend
            .hgetall(id)
            .await
            .map_err(|e| Error::operation(Operation::HashGetAll, e))?;

        if fields.is_empty() {
            trace!(session_id = %id, "Session not found");
            return Err(Error::NotFound(id.to_string()));
        }

        let session = Session::from_record(id, fields)?;
        trace!(
            session_id = %id,
            fields = session.len(),
            "Session loaded"
        );
        Ok(session)
    }

    /// Write the session back and renew its expiration.
    ///
    /// Pending removals are deleted first, then all current fields are
    /// written, then the TTL is reset to the session's validity from now.
    /// On success the session's removal tracking is cleared.
    pub async fn save(&self, session: &mut Session) -> Result<()> {
        let id = session.id().to_string();

        let removed = session.removed();
        if !removed.is_empty() {
            self.backend
                .hdel(&id, &removed)
                .await
                .map_err(|e| Error::operation(Operation::HashDelete, e))?;
        }

        self.backend
            .hset_multiple(&id, session.fields())
            .await
            .map_err(|e| Error::operation(Operation::HashSet, e))?;

        let renewed = self
            .backend
            .expire(&id, session.validity())
            .await
            .map_err(|e| Error::operation(Operation::Expire, e))?;
        session.mark_saved();

        debug!(
            session_id = %id,
            fields = session.len(),
            removed = removed.len(),
            renewed,
            "Session saved"
        );

        Ok(())
    }

    /// Delete the session stored under `id`.
    ///
    /// Fails with [`Error::NotFound`] if nothing was stored under it.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let deleted = self
            .backend
            .del(&[id.to_string()])
            .await
            .map_err(|e| Error::operation(Operation::KeyDelete, e))?;

        if deleted == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        debug!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Release the backend connection.
    ///
    /// Closing twice surfaces whatever the backend reports.
    pub async fn close(&self) -> Result<()> {
        self.backend
            .close()
            .await
            .map_err(|e| Error::operation(Operation::Close, e))
    }
}

impl<B: Backend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            ids: Arc::clone(&self.ids),
        }
    }
}
