//! Collaborator interfaces onto the entity store.
//!
//! The worker never talks to a concrete store. Discovery, single-field
//! writes, atomic batches, and the notification transport are each a trait so
//! a deployment can back them with the network store and tests can back them
//! with [`crate::memory::MemoryStore`].

use crate::error::StoreError;
use crate::notification::{Notification, NotificationSchema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// EntityId / EntityHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHandle {
    pub id: EntityId,
    pub entity_type: String,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Filter applied by [`EntityFinder::find`]. An empty list matches every
/// entity of the requested type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    FieldEquals { field: String, value: Value },
}

// ---------------------------------------------------------------------------
// FieldUpdate / Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub entity_id: EntityId,
    pub field: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(entity_id: EntityId, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            entity_id,
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Ordered updates that must become visible together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    updates: Vec<FieldUpdate>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, update: FieldUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn push(&mut self, update: FieldUpdate) {
        self.updates.push(update);
    }

    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

impl From<Vec<FieldUpdate>> for Batch {
    fn from(updates: Vec<FieldUpdate>) -> Self {
        Self { updates }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

pub trait EntityFinder: Send + Sync {
    /// Entities of `entity_type` matching every condition. Order carries no
    /// meaning.
    fn find(
        &self,
        entity_type: &str,
        conditions: &[Condition],
    ) -> Result<Vec<EntityHandle>, StoreError>;
}

pub trait FieldWriter: Send + Sync {
    /// Set a field. Subscribers are notified only if the value changed.
    fn write_field(&self, update: &FieldUpdate) -> Result<(), StoreError>;

    /// Set a field and notify subscribers even when the value is unchanged.
    fn push_field(&self, update: &FieldUpdate) -> Result<(), StoreError>;
}

pub trait BatchWriter: Send + Sync {
    /// Apply every update in `batch` as one unit. On error none of them are
    /// visible.
    fn apply_batch(&self, batch: &Batch) -> Result<(), StoreError>;
}

/// Invoked by the transport for every delivered notification.
pub type NotificationCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

pub trait SubscriptionHandle: Send + Sync {
    fn token(&self) -> &str;

    /// Release the registration. After this returns the callback is no longer
    /// invoked for new changes.
    ///
    /// Callers may hold a lock that in-flight callbacks are waiting on, so
    /// this must not block until running callbacks finish.
    fn unbind(self: Box<Self>) -> Result<(), StoreError>;
}

/// Registers callbacks for changes matching a schema.
///
/// `subscribe` and [`SubscriptionHandle::unbind`] are called while the caller
/// holds the lock its callback needs. Implementations must not invoke the
/// callback from inside either call; deliver from another thread or after
/// `subscribe` has returned.
pub trait NotificationTransport: Send + Sync {
    fn subscribe(
        &self,
        schema: &NotificationSchema,
        callback: NotificationCallback,
    ) -> Result<Box<dyn SubscriptionHandle>, StoreError>;
}

/// Everything the dispatcher needs from the store.
pub trait EntityStore: EntityFinder + FieldWriter + BatchWriter {}

impl<T: EntityFinder + FieldWriter + BatchWriter> EntityStore for T {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
