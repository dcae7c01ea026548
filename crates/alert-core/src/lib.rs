//! `alert-core` — leadership-gated alert dispatch.
//!
//! ```text
//! election ──▶ LeadershipGate ──subscribe/unbind──▶ NotificationTransport
//!                   │
//!                   ▼ (leader only)
//!              AlertDecoder ──▶ AlertDispatcher ──▶ EntityFinder
//!                                      │
//!                                      ├──▶ FieldWriter   (TTS, per entity)
//!                                      └──▶ BatchWriter   (email, per entity)
//! ```
//!
//! The store side is reached only through the traits in [`store`];
//! [`memory::MemoryStore`] implements all of them in-process.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod leadership;
pub mod memory;
pub mod notification;
pub mod store;
pub mod value;
pub mod worker;

pub use config::AlertConfig;
pub use dispatch::{AlertDispatcher, BranchReport, DispatchReport};
pub use error::{AlertError, DecodeError, Result, SchemaError, StoreError};
pub use leadership::{LeadershipEvent, LeadershipGate, NotificationHandler, Role};
pub use memory::MemoryStore;
pub use notification::{AlertDecoder, AlertRecord, Notification, NotificationSchema};
pub use value::{Value, ValueKind};
pub use worker::{AlertProcessor, AlertWorker};
