use crate::output::print_json;
use alert_core::memory::ChangeRecord;
use alert_core::notification::{fields, ContextValue};
use alert_core::store::{Batch, BatchWriter, EntityId, FieldUpdate};
use alert_core::{
    AlertConfig, AlertWorker, DispatchReport, MemoryStore, Notification, Role, Value,
};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Id of the single alert controller every scenario runs against.
const ALERT_ENTITY: &str = "alert";

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub actuators: Actuators,
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actuators {
    #[serde(default)]
    pub tts: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    /// Actuator ids whose writes the store rejects.
    #[serde(default)]
    pub failing: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    BecameLeader,
    LostLeadership,
    /// Set the alert controller's context fields, then fire its trigger.
    Alert {
        application_name: String,
        description: String,
        #[serde(default)]
        tts: bool,
        #[serde(default)]
        email: bool,
    },
    /// Deliver a hand-built context straight through the transport.
    Raw { context: Vec<ContextValue> },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::BecameLeader => "became_leader",
            Step::LostLeadership => "lost_leadership",
            Step::Alert { .. } => "alert",
            Step::Raw { .. } => "raw",
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub step: &'static str,
    pub role: Role,
    pub subscriptions: usize,
    /// Subscriptions the step's trigger reached.
    pub notified: usize,
    /// One per dispatch the step's notifications produced.
    pub reports: Vec<DispatchReport>,
    pub writes: Vec<ChangeRecord>,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub store_address: String,
    pub steps: Vec<StepOutcome>,
    pub total_writes: usize,
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

pub fn run(config: &AlertConfig, path: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&data)
        .with_context(|| format!("invalid scenario {}", path.display()))?;

    let summary = replay(config, &scenario)?;

    if json {
        print_json(&summary)?;
    } else {
        for s in &summary.steps {
            println!(
                "#{} {:<16} role={} subscriptions={} notified={} writes={}",
                s.index,
                s.step,
                s.role,
                s.subscriptions,
                s.notified,
                s.writes.len()
            );
            for r in &s.reports {
                println!(
                    "    tts {}/{} delivered, email {}/{} delivered",
                    r.tts.delivered, r.tts.attempted, r.email.delivered, r.email.attempted
                );
            }
            for w in &s.writes {
                println!("    {} {} = {}", w.entity_id, w.field, w.value);
            }
        }
        println!("total writes: {}", summary.total_writes);
    }
    Ok(())
}

pub fn replay(config: &AlertConfig, scenario: &Scenario) -> anyhow::Result<ReplaySummary> {
    let store = Arc::new(MemoryStore::new());
    let alert_id = EntityId::new(ALERT_ENTITY);
    let trigger = config.trigger.field.clone();

    store.insert_entity(
        alert_id.clone(),
        &config.trigger.entity_type,
        vec![
            (fields::APPLICATION_NAME.to_string(), Value::from("")),
            (fields::DESCRIPTION.to_string(), Value::from("")),
            (fields::TTS_ALERT.to_string(), Value::Bool(false)),
            (fields::EMAIL_ALERT.to_string(), Value::Bool(false)),
            (trigger.clone(), Value::Int(0)),
        ],
    );
    for id in &scenario.actuators.tts {
        store.insert_entity(
            EntityId::new(id.as_str()),
            &config.actuators.tts_entity_type,
            vec![("TextToSpeech", Value::from(""))],
        );
    }
    for id in &scenario.actuators.email {
        store.insert_entity(
            EntityId::new(id.as_str()),
            &config.actuators.email_entity_type,
            vec![
                ("Subject", Value::from("")),
                ("Body", Value::from("")),
                ("SendTrigger", Value::Int(0)),
            ],
        );
    }
    for id in &scenario.actuators.failing {
        store.fail_writes_for(&EntityId::new(id.as_str()));
    }

    let worker = AlertWorker::new(config, store.clone()).context("failed to build worker")?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut total_writes = 0;
    for (index, step) in scenario.steps.iter().enumerate() {
        store.clear_change_log();
        let notified = match step {
            Step::BecameLeader => {
                worker.on_became_leader();
                0
            }
            Step::LostLeadership => {
                worker.on_lost_leadership();
                0
            }
            Step::Alert {
                application_name,
                description,
                tts,
                email,
            } => {
                let context = Batch::from(vec![
                    FieldUpdate::new(
                        alert_id.clone(),
                        fields::APPLICATION_NAME,
                        application_name.as_str(),
                    ),
                    FieldUpdate::new(alert_id.clone(), fields::DESCRIPTION, description.as_str()),
                    FieldUpdate::new(alert_id.clone(), fields::TTS_ALERT, *tts),
                    FieldUpdate::new(alert_id.clone(), fields::EMAIL_ALERT, *email),
                ]);
                store
                    .apply_batch(&context)
                    .context("failed to stage alert context")?;
                store.clear_change_log();
                store.publish_trigger(&alert_id, &trigger)?
            }
            Step::Raw { context } => store.inject(&Notification {
                entity_id: alert_id.clone(),
                entity_type: config.trigger.entity_type.clone(),
                field: trigger.clone(),
                current: Value::Int(1),
                context: context.clone(),
                timestamp: Utc::now(),
            }),
        };

        let writes = store.change_log();
        total_writes += writes.len();
        steps.push(StepOutcome {
            index: index + 1,
            step: step.name(),
            role: worker.role(),
            subscriptions: worker.active_subscriptions(),
            notified,
            reports: worker.take_reports(),
            writes,
        });
    }

    Ok(ReplaySummary {
        store_address: config.store_address.clone(),
        steps,
        total_writes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
