use crate::config::AlertConfig;
use crate::dispatch::{AlertDispatcher, DispatchReport};
use crate::error::Result;
use crate::leadership::{LeadershipEvent, LeadershipGate, NotificationHandler, Role};
use crate::notification::{AlertDecoder, Notification};
use crate::store::{EntityStore, NotificationTransport};
use std::sync::{Arc, Mutex, PoisonError};

/// Reports kept for [`AlertProcessor::take_reports`]; older ones are dropped.
const REPORT_HISTORY: usize = 200;

// ---------------------------------------------------------------------------
// AlertProcessor
// ---------------------------------------------------------------------------

/// Decode then dispatch. Knows nothing about leadership.
///
/// Reports from subscription deliveries are kept until drained with
/// [`take_reports`](Self::take_reports).
pub struct AlertProcessor {
    decoder: AlertDecoder,
    dispatcher: AlertDispatcher,
    reports: Mutex<Vec<DispatchReport>>,
}

impl AlertProcessor {
    pub fn new(decoder: AlertDecoder, dispatcher: AlertDispatcher) -> Self {
        Self {
            decoder,
            dispatcher,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Reports recorded by [`NotificationHandler::handle`], oldest first.
    pub fn take_reports(&self) -> Vec<DispatchReport> {
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *reports)
    }

    fn record(&self, report: DispatchReport) {
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        reports.push(report);
        if reports.len() > REPORT_HISTORY {
            let excess = reports.len() - REPORT_HISTORY;
            reports.drain(..excess);
        }
    }

    /// `None` when the payload failed to decode and was dropped.
    pub fn process(&self, notification: &Notification) -> Option<DispatchReport> {
        tracing::info!(
            entity = %notification.entity_id,
            field = %notification.field,
            context = notification.context.len(),
            "received alert notification"
        );

        let alert = match self.decoder.decode(notification) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(
                    entity = %notification.entity_id,
                    error = %e,
                    "dropping undecodable alert notification"
                );
                return None;
            }
        };

        let report = self.dispatcher.dispatch(&alert);
        tracing::info!(
            application = %alert.application_name,
            tts_delivered = report.tts.delivered,
            tts_failed = report.tts.failed,
            email_delivered = report.email.delivered,
            email_failed = report.email.failed,
            "alert dispatched"
        );
        Some(report)
    }
}

impl NotificationHandler for AlertProcessor {
    fn handle(&self, notification: &Notification) {
        if let Some(report) = self.process(notification) {
            self.record(report);
        }
    }
}

// ---------------------------------------------------------------------------
// AlertWorker
// ---------------------------------------------------------------------------

/// The alert worker as wired into a process: a leadership gate whose
/// subscription feeds an [`AlertProcessor`].
pub struct AlertWorker {
    gate: LeadershipGate,
    processor: Arc<AlertProcessor>,
}

impl AlertWorker {
    /// Build against a store that is also its own notification transport.
    pub fn new<S>(config: &AlertConfig, store: Arc<S>) -> Result<Self>
    where
        S: EntityStore + NotificationTransport + 'static,
    {
        let transport: Arc<dyn NotificationTransport> = store.clone();
        Self::from_parts(config, store, transport)
    }

    pub fn from_parts(
        config: &AlertConfig,
        store: Arc<dyn EntityStore>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let schema = config.schema()?;
        let decoder = AlertDecoder::new(schema.clone())?;
        let dispatcher = AlertDispatcher::new(store, config.actuators.clone());
        let processor = Arc::new(AlertProcessor::new(decoder, dispatcher));
        let gate = LeadershipGate::new(transport, schema, processor.clone());
        Ok(Self { gate, processor })
    }

    pub fn role(&self) -> Role {
        self.gate.role()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.gate.active_subscriptions()
    }

    pub fn on_became_leader(&self) {
        self.gate.on_became_leader();
    }

    pub fn on_lost_leadership(&self) {
        self.gate.on_lost_leadership();
    }

    pub fn handle_leadership(&self, event: LeadershipEvent) {
        self.gate.handle(event);
    }

    /// Drain the reports of dispatches the subscription delivered.
    pub fn take_reports(&self) -> Vec<DispatchReport> {
        self.processor.take_reports()
    }

    /// The subscription callback path, callable directly. Followers return
    /// `None` without decoding; so do payloads that fail to decode.
    pub fn process_notification(&self, notification: &Notification) -> Option<DispatchReport> {
        let processor = &self.processor;
        self.gate
            .while_leader(|| processor.process(notification))
            .flatten()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
