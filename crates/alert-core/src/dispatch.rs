//! Turns a decoded alert into actuator writes.
//!
//! TTS alerts push the description to every audio actuator, one write per
//! entity. Email alerts write subject, body and the send trigger to every
//! email relay as one batch per entity, so a relay never sees a subject from
//! one alert paired with the body of another. Delivery is best effort per
//! entity: a failure is logged and the next entity is still attempted.

use crate::config::ActuatorConfig;
use crate::notification::AlertRecord;
use crate::store::{Batch, EntityHandle, EntityStore, FieldUpdate};
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

pub const TEXT_TO_SPEECH_FIELD: &str = "TextToSpeech";
pub const SUBJECT_FIELD: &str = "Subject";
pub const BODY_FIELD: &str = "Body";
pub const SEND_TRIGGER_FIELD: &str = "SendTrigger";

/// Value written to `SendTrigger` once subject and body are in place.
pub const SEND_TRIGGER_RESET: i64 = 0;

pub fn email_subject(application_name: &str) -> String {
    format!("Alert from '{application_name}' service")
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BranchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl BranchReport {
    fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Outcome of one dispatch. A branch that was not requested stays zeroed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub tts: BranchReport,
    pub email: BranchReport,
}

impl DispatchReport {
    pub fn is_noop(&self) -> bool {
        self.tts.attempted == 0 && self.email.attempted == 0
    }
}

// ---------------------------------------------------------------------------
// AlertDispatcher
// ---------------------------------------------------------------------------

pub struct AlertDispatcher {
    store: Arc<dyn EntityStore>,
    actuators: ActuatorConfig,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn EntityStore>, actuators: ActuatorConfig) -> Self {
        Self { store, actuators }
    }

    pub fn dispatch(&self, alert: &AlertRecord) -> DispatchReport {
        let mut report = DispatchReport::default();

        if alert.tts_alert {
            tracing::info!(
                application = %alert.application_name,
                description = %alert.description,
                "sending TTS alert"
            );
            for actuator in self.discover(&self.actuators.tts_entity_type) {
                report.tts.record(self.speak(&actuator, &alert.description));
            }
        }

        if alert.email_alert {
            tracing::info!(
                application = %alert.application_name,
                description = %alert.description,
                "sending email alert"
            );
            for actuator in self.discover(&self.actuators.email_entity_type) {
                report.email.record(self.send_email(&actuator, alert));
            }
        }

        if report.is_noop() {
            tracing::debug!(application = %alert.application_name, "alert produced no writes");
        }
        report
    }

    /// Unfiltered lookup by type. A failed lookup is logged and treated as
    /// "no actuators" for that branch.
    fn discover(&self, entity_type: &str) -> Vec<EntityHandle> {
        match self.store.find(entity_type, &[]) {
            Ok(found) => {
                if found.is_empty() {
                    tracing::debug!(entity_type, "no actuators found");
                }
                found
            }
            Err(e) => {
                tracing::warn!(entity_type, error = %e, "actuator discovery failed");
                Vec::new()
            }
        }
    }

    fn speak(&self, actuator: &EntityHandle, description: &str) -> bool {
        let update = FieldUpdate::new(
            actuator.id.clone(),
            TEXT_TO_SPEECH_FIELD,
            Value::String(description.to_string()),
        );
        match self.store.push_field(&update) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(entity = %actuator.id, error = %e, "TTS write failed");
                false
            }
        }
    }

    fn send_email(&self, actuator: &EntityHandle, alert: &AlertRecord) -> bool {
        let batch = email_batch(actuator, alert);
        match self.store.apply_batch(&batch) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(entity = %actuator.id, error = %e, "email batch failed");
                false
            }
        }
    }
}

fn email_batch(actuator: &EntityHandle, alert: &AlertRecord) -> Batch {
    let id = &actuator.id;
    Batch::new()
        .with(FieldUpdate::new(
            id.clone(),
            SUBJECT_FIELD,
            email_subject(&alert.application_name),
        ))
        .with(FieldUpdate::new(
            id.clone(),
            BODY_FIELD,
            alert.description.clone(),
        ))
        .with(FieldUpdate::new(
            id.clone(),
            SEND_TRIGGER_FIELD,
            Value::Int(SEND_TRIGGER_RESET),
        ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{BatchWriter, Condition, EntityFinder, EntityId, FieldWriter};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every call; entities and failures are scripted up front.
    #[derive(Default)]
    struct Recorder {
        entities: HashMap<String, Vec<EntityHandle>>,
        failing: Vec<EntityId>,
        finds: Mutex<Vec<String>>,
        pushes: Mutex<Vec<FieldUpdate>>,
        batches: Mutex<Vec<Batch>>,
    }

    impl Recorder {
        fn with_entities(mut self, entity_type: &str, ids: &[&str]) -> Self {
            self.entities.insert(
                entity_type.to_string(),
                ids.iter()
                    .map(|id| EntityHandle {
                        id: EntityId::new(*id),
                        entity_type: entity_type.to_string(),
                    })
                    .collect(),
            );
            self
        }

        fn failing_on(mut self, id: &str) -> Self {
            self.failing.push(EntityId::new(id));
            self
        }

        fn check(&self, id: &EntityId) -> Result<(), StoreError> {
            if self.failing.contains(id) {
                return Err(StoreError::Rejected {
                    entity: id.to_string(),
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }
    }

    impl EntityFinder for Recorder {
        fn find(
            &self,
            entity_type: &str,
            conditions: &[Condition],
        ) -> Result<Vec<EntityHandle>, StoreError> {
            assert!(conditions.is_empty());
            self.finds.lock().unwrap().push(entity_type.to_string());
            Ok(self.entities.get(entity_type).cloned().unwrap_or_default())
        }
    }

    impl FieldWriter for Recorder {
        fn write_field(&self, _update: &FieldUpdate) -> Result<(), StoreError> {
            panic!("dispatcher should push TTS, not write");
        }

        fn push_field(&self, update: &FieldUpdate) -> Result<(), StoreError> {
            self.pushes.lock().unwrap().push(update.clone());
            self.check(&update.entity_id)
        }
    }

    impl BatchWriter for Recorder {
        fn apply_batch(&self, batch: &Batch) -> Result<(), StoreError> {
            self.batches.lock().unwrap().push(batch.clone());
            self.check(&batch.updates()[0].entity_id)
        }
    }

    fn alert(tts: bool, email: bool) -> AlertRecord {
        AlertRecord {
            application_name: "billing".into(),
            description: "queue backlog above threshold".into(),
            tts_alert: tts,
            email_alert: email,
        }
    }

    fn dispatcher(rec: Arc<Recorder>) -> AlertDispatcher {
        AlertDispatcher::new(rec, ActuatorConfig::default())
    }

    #[test]
    fn tts_only_pushes_description_to_each_speaker() {
        let rec = Arc::new(
            Recorder::default().with_entities("AudioController", &["a1", "a2", "a3"]),
        );
        let report = dispatcher(rec.clone()).dispatch(&alert(true, false));

        let pushes = rec.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 3);
        for p in pushes.iter() {
            assert_eq!(p.field, TEXT_TO_SPEECH_FIELD);
            assert_eq!(p.value, Value::from("queue backlog above threshold"));
        }
        assert!(rec.batches.lock().unwrap().is_empty());
        assert_eq!(*rec.finds.lock().unwrap(), ["AudioController"]);
        assert_eq!(report.tts.delivered, 3);
        assert_eq!(report.email, BranchReport::default());
    }

    #[test]
    fn email_sends_one_three_field_batch_per_relay() {
        let rec = Arc::new(Recorder::default().with_entities("SmtpController", &["s1", "s2"]));
        let report = dispatcher(rec.clone()).dispatch(&alert(false, true));

        let batches = rec.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        for (batch, id) in batches.iter().zip(["s1", "s2"]) {
            let u = batch.updates();
            assert_eq!(u.len(), 3);
            assert!(u.iter().all(|x| x.entity_id.as_str() == id));
            assert_eq!(u[0].field, SUBJECT_FIELD);
            assert_eq!(u[0].value, Value::from("Alert from 'billing' service"));
            assert_eq!(u[1].field, BODY_FIELD);
            assert_eq!(u[1].value, Value::from("queue backlog above threshold"));
            assert_eq!(u[2].field, SEND_TRIGGER_FIELD);
            assert_eq!(u[2].value, Value::Int(SEND_TRIGGER_RESET));
        }
        assert!(rec.pushes.lock().unwrap().is_empty());
        assert_eq!(report.email.delivered, 2);
    }

    #[test]
    fn both_flags_false_touches_nothing() {
        let rec = Arc::new(
            Recorder::default()
                .with_entities("AudioController", &["a1"])
                .with_entities("SmtpController", &["s1"]),
        );
        let report = dispatcher(rec.clone()).dispatch(&alert(false, false));
        assert!(report.is_noop());
        assert!(rec.finds.lock().unwrap().is_empty());
        assert!(rec.pushes.lock().unwrap().is_empty());
        assert!(rec.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn no_actuators_is_not_an_error() {
        let rec = Arc::new(Recorder::default());
        let report = dispatcher(rec.clone()).dispatch(&alert(true, true));
        assert!(report.is_noop());
        assert_eq!(
            *rec.finds.lock().unwrap(),
            ["AudioController", "SmtpController"]
        );
    }

    #[test]
    fn failing_actuator_does_not_stop_siblings() {
        let rec = Arc::new(
            Recorder::default()
                .with_entities("AudioController", &["a1", "a2", "a3"])
                .with_entities("SmtpController", &["s1", "s2"])
                .failing_on("a1")
                .failing_on("s2"),
        );
        let report = dispatcher(rec.clone()).dispatch(&alert(true, true));
        assert_eq!(rec.pushes.lock().unwrap().len(), 3);
        assert_eq!(rec.batches.lock().unwrap().len(), 2);
        assert_eq!(
            report.tts,
            BranchReport {
                attempted: 3,
                delivered: 2,
                failed: 1
            }
        );
        assert_eq!(
            report.email,
            BranchReport {
                attempted: 2,
                delivered: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn subject_names_application() {
        assert_eq!(email_subject("api"), "Alert from 'api' service");
    }
}
