//! In-memory view of one session's fields.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::MAX_VALIDITY_SECS;
use crate::error::{Error, Result};

/// Hash field holding the session's validity in seconds.
pub const VALIDITY_FIELD: &str = "__valid__";

/// A session loaded from or about to be written to the backing store.
///
/// Values are stored JSON-encoded, one hash field per key. Removals are
/// tracked until the next successful [`Store::save`](crate::Store::save)
/// so they can be deleted from the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    values: HashMap<String, String>,
    removed: HashSet<String>,
    validity: Duration,
    dirty: bool,
}

impl Session {
    /// Create a fresh session holding only its validity marker.
    pub(crate) fn new(id: impl Into<String>, validity: Duration) -> Result<Self> {
        let secs = validity_secs(validity)?;
        let mut values = HashMap::new();
        values.insert(VALIDITY_FIELD.to_string(), secs.to_string());

        Ok(Self {
            id: id.into(),
            values,
            removed: HashSet::new(),
            validity,
            dirty: false,
        })
    }

    /// Rebuild a session from the fields of a stored record.
    pub(crate) fn from_record(id: impl Into<String>, values: HashMap<String, String>) -> Result<Self> {
        let id = id.into();
        let raw = values.get(VALIDITY_FIELD).ok_or_else(|| Error::Corrupted {
            id: id.clone(),
            reason: format!("missing field '{}'", VALIDITY_FIELD),
        })?;
        let secs = raw
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| raw.parse::<u64>().ok())
            .flatten()
            .ok_or_else(|| Error::Corrupted {
                id: id.clone(),
                reason: format!("unreadable validity '{}'", raw),
            })?;
        if secs == 0 || secs > MAX_VALIDITY_SECS {
            return Err(Error::Corrupted {
                id,
                reason: format!("validity of {} seconds is out of range", secs),
            });
        }

        Ok(Self {
            id,
            values,
            removed: HashSet::new(),
            validity: Duration::from_secs(secs),
            dirty: false,
        })
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// How long the stored record lives after its last save.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Change the validity applied on the next save.
    pub fn set_validity(&mut self, validity: Duration) -> Result<()> {
        let secs = validity_secs(validity)?;
        self.values
            .insert(VALIDITY_FIELD.to_string(), secs.to_string());
        self.validity = validity;
        self.dirty = true;
        Ok(())
    }

    /// Encode `value` and store it under `key`, replacing any previous value.
    ///
    /// A pending removal of `key` is cancelled.
    pub fn add<T>(&mut self, key: impl Into<String>, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        if key == VALIDITY_FIELD {
            return Err(Error::ReservedField(key));
        }
        let encoded = serde_json::to_string(value).map_err(|e| Error::Encode {
            key: key.clone(),
            source: e,
        })?;

        self.removed.remove(&key);
        self.values.insert(key, encoded);
        self.dirty = true;
        Ok(())
    }

    /// Decode the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        if key == VALIDITY_FIELD {
            return Err(Error::ValueNotFound(key.to_string()));
        }
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| Error::ValueNotFound(key.to_string()))?;
        serde_json::from_str(raw).map_err(|e| Error::Decode {
            key: key.to_string(),
            source: e,
        })
    }

    /// Drop `key` now and delete it from the stored record on the next save.
    ///
    /// Unknown keys and the validity field are ignored.
    pub fn remove(&mut self, key: &str) {
        if key == VALIDITY_FIELD {
            return;
        }
        if self.values.remove(key).is_some() {
            self.removed.insert(key.to_string());
            self.dirty = true;
        }
    }

    /// Whether a caller value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        key != VALIDITY_FIELD && self.values.contains_key(key)
    }

    /// Number of caller values (the validity field is not counted).
    pub fn len(&self) -> usize {
        self.values.len() - usize::from(self.values.contains_key(VALIDITY_FIELD))
    }

    /// Whether the session holds no caller values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored field, including the validity field, as encoded strings.
    pub fn values(&self) -> HashMap<String, String> {
        self.values.clone()
    }

    /// Keys removed since the session was loaded or last saved, sorted.
    pub fn removed(&self) -> Vec<String> {
        let mut removed: Vec<String> = self.removed.iter().cloned().collect();
        removed.sort();
        removed
    }

    /// Whether the session has changes not yet written to the store.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn fields(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Forget pending removals after they reached the store.
    pub(crate) fn mark_saved(&mut self) {
        self.removed.clear();
        self.dirty = false;
    }
}

/// Whole seconds of `validity`, rejecting anything below one second or
/// above [`MAX_VALIDITY_SECS`].
pub(crate) fn validity_secs(validity: Duration) -> Result<u64> {
    match validity.as_secs() {
        0 => Err(Error::InvalidValidity(validity)),
        secs if secs > MAX_VALIDITY_SECS => Err(Error::InvalidValidity(validity)),
        secs => Ok(secs),
    }
}
