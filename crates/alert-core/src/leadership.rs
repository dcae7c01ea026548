//! Leadership gate.
//!
//! Transitions: `Follower → Leader → Follower`, starting as `Follower`.
//!
//! The role and the held subscription live behind one `RwLock`. Transitions
//! take the write half; every delivered notification runs its handler under
//! the read half, so once `on_lost_leadership` returns no handler is running
//! and none will start until the next `on_became_leader`. A handler must not
//! call back into the gate.

use crate::notification::{Notification, NotificationSchema};
use crate::store::{NotificationCallback, NotificationTransport, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Follower,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Follower => "follower",
            Role::Leader => "leader",
        })
    }
}

/// Signals emitted by the external election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadershipEvent {
    BecameLeader,
    LosingLeadership,
}

pub trait NotificationHandler: Send + Sync {
    fn handle(&self, notification: &Notification);
}

struct GateState {
    role: Role,
    subscriptions: Vec<Box<dyn SubscriptionHandle>>,
}

pub struct LeadershipGate {
    transport: Arc<dyn NotificationTransport>,
    schema: NotificationSchema,
    handler: Arc<dyn NotificationHandler>,
    state: Arc<RwLock<GateState>>,
}

impl LeadershipGate {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        schema: NotificationSchema,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self {
        Self {
            transport,
            schema,
            handler,
            state: Arc::new(RwLock::new(GateState {
                role: Role::Follower,
                subscriptions: Vec::new(),
            })),
        }
    }

    pub fn role(&self) -> Role {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .role
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriptions
            .len()
    }

    pub fn handle(&self, event: LeadershipEvent) {
        match event {
            LeadershipEvent::BecameLeader => self.on_became_leader(),
            LeadershipEvent::LosingLeadership => self.on_lost_leadership(),
        }
    }

    /// Become leader and hold exactly one subscription.
    ///
    /// Repeated calls while already subscribed change nothing. If an earlier
    /// registration failed the call retries it. A failed registration is
    /// logged and the role is still `Leader`.
    pub fn on_became_leader(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.role = Role::Leader;

        if !state.subscriptions.is_empty() {
            tracing::debug!("already leader with an active subscription");
            return;
        }

        match self.transport.subscribe(&self.schema, self.callback()) {
            Ok(handle) => {
                tracing::info!(
                    token = handle.token(),
                    entity_type = self.schema.entity_type(),
                    field = self.schema.trigger_field(),
                    "became leader, subscribed to alert trigger"
                );
                state.subscriptions.push(handle);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    entity_type = self.schema.entity_type(),
                    "became leader but alert subscription failed"
                );
            }
        }
    }

    /// Drop to follower and release every held subscription. Unbind failures
    /// are logged; the handle is discarded either way.
    pub fn on_lost_leadership(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.role = Role::Follower;

        let held = std::mem::take(&mut state.subscriptions);
        if held.is_empty() {
            tracing::debug!("lost leadership with no subscription held");
        }
        for handle in held {
            let token = handle.token().to_string();
            match handle.unbind() {
                Ok(()) => tracing::info!(token = %token, "lost leadership, unsubscribed"),
                Err(e) => tracing::warn!(token = %token, error = %e, "unbind failed"),
            }
        }
    }

    /// Run `f` only while leader, holding the role steady until it returns.
    pub fn while_leader<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        run_if_leader(&self.state, f)
    }

    /// Deliver a notification to the handler if currently leader. Returns
    /// whether it was handled.
    pub fn deliver(&self, notification: &Notification) -> bool {
        let handler = &self.handler;
        self.while_leader(|| handler.handle(notification)).is_some()
    }

    fn callback(&self) -> NotificationCallback {
        // Weak: the transport owning the callback must not keep the gate alive.
        let state = Arc::downgrade(&self.state);
        let handler = Arc::clone(&self.handler);
        Arc::new(move |notification: &Notification| {
            if let Some(state) = state.upgrade() {
                run_if_leader(&state, || handler.handle(notification));
            }
        })
    }
}

fn run_if_leader<R>(state: &RwLock<GateState>, f: impl FnOnce() -> R) -> Option<R> {
    let guard = state.read().unwrap_or_else(PoisonError::into_inner);
    if guard.role != Role::Leader {
        return None;
    }
    let out = f();
    drop(guard);
    Some(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
