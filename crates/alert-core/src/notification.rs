use crate::error::{DecodeError, SchemaError};
use crate::store::EntityId;
use crate::value::{Value, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Context field names declared by the alert trigger subscription.
pub mod fields {
    pub const APPLICATION_NAME: &str = "ApplicationName";
    pub const DESCRIPTION: &str = "Description";
    pub const TTS_ALERT: &str = "TTSAlert";
    pub const EMAIL_ALERT: &str = "EmailAlert";
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextValue {
    pub field: String,
    pub value: Value,
}

/// A change on a watched field, with the declared context values in the
/// order they were declared at subscription time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub field: String,
    pub current: Value,
    #[serde(default)]
    pub context: Vec<ContextValue>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// NotificationSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextField {
    pub name: String,
    pub kind: ValueKind,
}

impl ContextField {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// What a subscription watches and which typed context it asks for.
///
/// Built once when the subscription is registered and reused to validate
/// every payload delivered on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSchema {
    entity_type: String,
    trigger_field: String,
    context: Vec<ContextField>,
}

impl NotificationSchema {
    pub fn new(
        entity_type: impl Into<String>,
        trigger_field: impl Into<String>,
        context: Vec<ContextField>,
    ) -> Result<Self, SchemaError> {
        let entity_type = entity_type.into();
        let trigger_field = trigger_field.into();
        if entity_type.trim().is_empty() {
            return Err(SchemaError::BlankTrigger("entity type"));
        }
        if trigger_field.trim().is_empty() {
            return Err(SchemaError::BlankTrigger("trigger field"));
        }
        if context.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::new();
        for (i, f) in context.iter().enumerate() {
            if f.name.trim().is_empty() {
                return Err(SchemaError::BlankField(i));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateField(f.name.clone()));
            }
        }
        Ok(Self {
            entity_type,
            trigger_field,
            context,
        })
    }

    /// The alert controller subscription: four context fields in the order
    /// `ApplicationName, Description, TTSAlert, EmailAlert`.
    pub fn alert_trigger(
        entity_type: impl Into<String>,
        trigger_field: impl Into<String>,
    ) -> Result<Self, SchemaError> {
        Self::new(
            entity_type,
            trigger_field,
            vec![
                ContextField::new(fields::APPLICATION_NAME, ValueKind::String),
                ContextField::new(fields::DESCRIPTION, ValueKind::String),
                ContextField::new(fields::TTS_ALERT, ValueKind::Bool),
                ContextField::new(fields::EMAIL_ALERT, ValueKind::Bool),
            ],
        )
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn trigger_field(&self) -> &str {
        &self.trigger_field
    }

    pub fn context(&self) -> &[ContextField] {
        &self.context
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.context.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.context.iter().position(|f| f.name == name)
    }

    /// Check every context value against its declared kind. Position alone
    /// decides which declaration applies; the name carried in the payload is
    /// informational.
    pub fn validate(&self, notification: &Notification) -> Result<(), DecodeError> {
        if notification.context.len() != self.context.len() {
            return Err(DecodeError::Arity {
                expected: self.context.len(),
                actual: notification.context.len(),
            });
        }
        for (position, (declared, got)) in self
            .context
            .iter()
            .zip(notification.context.iter())
            .enumerate()
        {
            let actual = got.value.kind();
            if actual != declared.kind {
                return Err(DecodeError::TypeMismatch {
                    position,
                    field: declared.name.clone(),
                    expected: declared.kind,
                    actual,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AlertRecord / AlertDecoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub application_name: String,
    pub description: String,
    pub tts_alert: bool,
    pub email_alert: bool,
}

/// Decodes alert trigger notifications into [`AlertRecord`]s.
#[derive(Debug, Clone)]
pub struct AlertDecoder {
    schema: NotificationSchema,
    application_name: usize,
    description: usize,
    tts_alert: usize,
    email_alert: usize,
}

impl AlertDecoder {
    /// Fails if `schema` does not declare each alert field with its kind.
    pub fn new(schema: NotificationSchema) -> Result<Self, SchemaError> {
        let locate = |name: &str, expected: ValueKind| -> Result<usize, SchemaError> {
            let pos = schema
                .position(name)
                .ok_or_else(|| SchemaError::MissingField(name.to_string()))?;
            let declared = schema.context[pos].kind;
            if declared != expected {
                return Err(SchemaError::WrongKind {
                    field: name.to_string(),
                    declared,
                    expected,
                });
            }
            Ok(pos)
        };
        let application_name = locate(fields::APPLICATION_NAME, ValueKind::String)?;
        let description = locate(fields::DESCRIPTION, ValueKind::String)?;
        let tts_alert = locate(fields::TTS_ALERT, ValueKind::Bool)?;
        let email_alert = locate(fields::EMAIL_ALERT, ValueKind::Bool)?;
        Ok(Self {
            schema,
            application_name,
            description,
            tts_alert,
            email_alert,
        })
    }

    pub fn schema(&self) -> &NotificationSchema {
        &self.schema
    }

    pub fn decode(&self, notification: &Notification) -> Result<AlertRecord, DecodeError> {
        self.schema.validate(notification)?;
        Ok(AlertRecord {
            application_name: self.string_at(notification, self.application_name)?,
            description: self.string_at(notification, self.description)?,
            tts_alert: self.bool_at(notification, self.tts_alert)?,
            email_alert: self.bool_at(notification, self.email_alert)?,
        })
    }

    fn string_at(&self, n: &Notification, position: usize) -> Result<String, DecodeError> {
        match &n.context[position].value {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(position, other)),
        }
    }

    fn bool_at(&self, n: &Notification, position: usize) -> Result<bool, DecodeError> {
        match &n.context[position].value {
            Value::Bool(b) => Ok(*b),
            other => Err(self.mismatch(position, other)),
        }
    }

    fn mismatch(&self, position: usize, got: &Value) -> DecodeError {
        let declared = &self.schema.context[position];
        DecodeError::TypeMismatch {
            position,
            field: declared.name.clone(),
            expected: declared.kind,
            actual: got.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
