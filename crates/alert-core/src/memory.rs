//! In-process entity store.
//!
//! Implements every collaborator trait against a single mutex-guarded map, so
//! a batch is trivially atomic: it is validated and applied without releasing
//! the lock. Notifications are collected under the lock and delivered after
//! it is released, which lets a callback write back into the store.
//!
//! Used by the test suites and by `alert-worker replay`.

use crate::error::StoreError;
use crate::notification::{ContextValue, Notification, NotificationSchema};
use crate::store::{
    Batch, BatchWriter, Condition, EntityFinder, EntityHandle, EntityId, FieldUpdate, FieldWriter,
    NotificationCallback, NotificationTransport, SubscriptionHandle,
};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ChangeRecord
// ---------------------------------------------------------------------------

/// One applied field write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub at: DateTime<Utc>,
    pub entity_id: EntityId,
    pub field: String,
    pub value: Value,
    /// Set when the write was part of a batch; shared by its siblings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<Uuid>,
    pub pushed: bool,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Entity {
    entity_type: String,
    fields: BTreeMap<String, Value>,
}

struct Registration {
    token: String,
    schema: NotificationSchema,
    callback: NotificationCallback,
}

#[derive(Default)]
struct Faults {
    failing_entities: HashSet<EntityId>,
    fail_subscribe: bool,
    fail_unbind: bool,
    fail_discovery: bool,
}

#[derive(Default)]
struct Inner {
    entities: BTreeMap<EntityId, Entity>,
    registrations: Vec<Registration>,
    log: Vec<ChangeRecord>,
    faults: Faults,
    find_calls: usize,
}

type Pending = Vec<(NotificationCallback, Notification)>;

impl Inner {
    fn check_write(&self, update: &FieldUpdate) -> Result<(), StoreError> {
        let entity = self
            .entities
            .get(&update.entity_id)
            .ok_or_else(|| StoreError::EntityNotFound(update.entity_id.to_string()))?;
        if !entity.fields.contains_key(&update.field) {
            return Err(StoreError::FieldNotFound {
                entity: update.entity_id.to_string(),
                field: update.field.clone(),
            });
        }
        if self.faults.failing_entities.contains(&update.entity_id) {
            return Err(StoreError::Rejected {
                entity: update.entity_id.to_string(),
                reason: "injected write failure".into(),
            });
        }
        Ok(())
    }

    /// Apply an already checked update and queue notifications it fires.
    fn apply(
        &mut self,
        update: &FieldUpdate,
        push: bool,
        batch: Option<Uuid>,
        pending: &mut Pending,
    ) {
        let Some(entity) = self.entities.get_mut(&update.entity_id) else {
            return;
        };
        let previous = entity.fields.insert(update.field.clone(), update.value.clone());
        let changed = previous.as_ref() != Some(&update.value);
        let entity_type = entity.entity_type.clone();

        self.log.push(ChangeRecord {
            at: Utc::now(),
            entity_id: update.entity_id.clone(),
            field: update.field.clone(),
            value: update.value.clone(),
            batch,
            pushed: push,
        });

        if changed || push {
            self.collect(&update.entity_id, &entity_type, &update.field, pending);
        }
    }

    fn collect(&self, id: &EntityId, entity_type: &str, field: &str, pending: &mut Pending) {
        for reg in &self.registrations {
            if reg.schema.entity_type() == entity_type && reg.schema.trigger_field() == field {
                if let Some(n) = self.build_notification(id, field, &reg.schema.field_names()) {
                    pending.push((Arc::clone(&reg.callback), n));
                }
            }
        }
    }

    /// Context values follow `context_fields`; fields the entity lacks are
    /// left out, which the decoder reports as an arity error.
    fn build_notification(
        &self,
        id: &EntityId,
        field: &str,
        context_fields: &[&str],
    ) -> Option<Notification> {
        let entity = self.entities.get(id)?;
        let current = entity.fields.get(field)?.clone();
        let context = context_fields
            .iter()
            .filter_map(|name| {
                entity.fields.get(*name).map(|value| ContextValue {
                    field: name.to_string(),
                    value: value.clone(),
                })
            })
            .collect();
        Some(Notification {
            entity_id: id.clone(),
            entity_type: entity.entity_type.clone(),
            field: field.to_string(),
            current,
            context,
            timestamp: Utc::now(),
        })
    }
}

fn deliver(pending: Pending) {
    for (callback, notification) in pending {
        callback(&notification);
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an entity with a fresh id. The listed fields are the only ones
    /// it can be written on.
    pub fn create_entity<K, I>(&self, entity_type: &str, fields: I) -> EntityId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let id = EntityId::new(Uuid::new_v4().to_string());
        self.insert_entity(id.clone(), entity_type, fields);
        id
    }

    pub fn insert_entity<K, I>(&self, id: EntityId, entity_type: &str, fields: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entity = Entity {
            entity_type: entity_type.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        self.lock().entities.insert(id, entity);
    }

    pub fn field(&self, id: &EntityId, field: &str) -> Option<Value> {
        self.lock().entities.get(id)?.fields.get(field).cloned()
    }

    pub fn change_log(&self) -> Vec<ChangeRecord> {
        self.lock().log.clone()
    }

    pub fn clear_change_log(&self) {
        self.lock().log.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// How many `find` calls have been served.
    pub fn find_calls(&self) -> usize {
        self.lock().find_calls
    }

    pub fn fail_writes_for(&self, id: &EntityId) {
        self.lock().faults.failing_entities.insert(id.clone());
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.lock().faults.fail_subscribe = fail;
    }

    pub fn fail_unbind(&self, fail: bool) {
        self.lock().faults.fail_unbind = fail;
    }

    pub fn fail_discovery(&self, fail: bool) {
        self.lock().faults.fail_discovery = fail;
    }

    /// Build the notification a change on `field` would deliver with the
    /// given context fields, without delivering it.
    pub fn notification_for(
        &self,
        id: &EntityId,
        field: &str,
        context_fields: &[String],
    ) -> Result<Notification, StoreError> {
        let inner = self.lock();
        let names: Vec<&str> = context_fields.iter().map(String::as_str).collect();
        inner
            .build_notification(id, field, &names)
            .ok_or_else(|| StoreError::FieldNotFound {
                entity: id.to_string(),
                field: field.to_string(),
            })
    }

    /// Fire `field` on `id` as if it had been pushed with its current value.
    /// Returns how many subscriptions were notified.
    pub fn publish_trigger(&self, id: &EntityId, field: &str) -> Result<usize, StoreError> {
        let mut pending = Pending::new();
        {
            let inner = self.lock();
            let entity = inner
                .entities
                .get(id)
                .ok_or_else(|| StoreError::EntityNotFound(id.to_string()))?;
            if !entity.fields.contains_key(field) {
                return Err(StoreError::FieldNotFound {
                    entity: id.to_string(),
                    field: field.to_string(),
                });
            }
            let entity_type = entity.entity_type.clone();
            inner.collect(id, &entity_type, field, &mut pending);
        }
        let count = pending.len();
        deliver(pending);
        Ok(count)
    }

    /// Hand a prebuilt notification to every subscription watching its entity
    /// type and field, bypassing the stored field values.
    pub fn inject(&self, notification: &Notification) -> usize {
        let callbacks: Vec<NotificationCallback> = self
            .lock()
            .registrations
            .iter()
            .filter(|r| {
                r.schema.entity_type() == notification.entity_type
                    && r.schema.trigger_field() == notification.field
            })
            .map(|r| Arc::clone(&r.callback))
            .collect();
        for callback in &callbacks {
            callback(notification);
        }
        callbacks.len()
    }

    fn write(&self, update: &FieldUpdate, push: bool) -> Result<(), StoreError> {
        let mut pending = Pending::new();
        {
            let mut inner = self.lock();
            inner.check_write(update)?;
            inner.apply(update, push, None, &mut pending);
        }
        deliver(pending);
        Ok(())
    }
}

impl EntityFinder for MemoryStore {
    fn find(
        &self,
        entity_type: &str,
        conditions: &[Condition],
    ) -> Result<Vec<EntityHandle>, StoreError> {
        let mut inner = self.lock();
        inner.find_calls += 1;
        if inner.faults.fail_discovery {
            return Err(StoreError::Transport("injected discovery failure".into()));
        }
        let found = inner
            .entities
            .iter()
            .filter(|(_, e)| e.entity_type == entity_type)
            .filter(|(_, e)| {
                conditions.iter().all(|c| match c {
                    Condition::FieldEquals { field, value } => e.fields.get(field) == Some(value),
                })
            })
            .map(|(id, e)| EntityHandle {
                id: id.clone(),
                entity_type: e.entity_type.clone(),
            })
            .collect();
        Ok(found)
    }
}

impl FieldWriter for MemoryStore {
    fn write_field(&self, update: &FieldUpdate) -> Result<(), StoreError> {
        self.write(update, false)
    }

    fn push_field(&self, update: &FieldUpdate) -> Result<(), StoreError> {
        self.write(update, true)
    }
}

impl BatchWriter for MemoryStore {
    fn apply_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut pending = Pending::new();
        {
            let mut inner = self.lock();
            for update in batch.updates() {
                inner.check_write(update)?;
            }
            let batch_id = Uuid::new_v4();
            for update in batch.updates() {
                inner.apply(update, false, Some(batch_id), &mut pending);
            }
        }
        deliver(pending);
        Ok(())
    }
}

impl NotificationTransport for MemoryStore {
    fn subscribe(
        &self,
        schema: &NotificationSchema,
        callback: NotificationCallback,
    ) -> Result<Box<dyn SubscriptionHandle>, StoreError> {
        let mut inner = self.lock();
        if inner.faults.fail_subscribe {
            return Err(StoreError::Transport("injected subscribe failure".into()));
        }
        let token = Uuid::new_v4().to_string();
        inner.registrations.push(Registration {
            token: token.clone(),
            schema: schema.clone(),
            callback,
        });
        Ok(Box::new(MemorySubscription {
            token,
            store: Arc::downgrade(&self.inner),
        }))
    }
}

// ---------------------------------------------------------------------------
// MemorySubscription
// ---------------------------------------------------------------------------

pub struct MemorySubscription {
    token: String,
    store: Weak<Mutex<Inner>>,
}

impl SubscriptionHandle for MemorySubscription {
    fn token(&self) -> &str {
        &self.token
    }

    fn unbind(self: Box<Self>) -> Result<(), StoreError> {
        let store = self
            .store
            .upgrade()
            .ok_or_else(|| StoreError::Transport("store dropped".into()))?;
        let mut inner = store.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.registrations.len();
        inner.registrations.retain(|r| r.token != self.token);
        if inner.registrations.len() == before {
            return Err(StoreError::Unbound(self.token.clone()));
        }
        if inner.faults.fail_unbind {
            // The registration is gone but the caller is told it failed.
            return Err(StoreError::Transport("injected unbind failure".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
