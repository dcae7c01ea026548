use crate::value::ValueKind;
use thiserror::Error;

/// A notification payload that does not match the declared context schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("context value at position {position} ('{field}') is {actual}, expected {expected}")]
    TypeMismatch {
        position: usize,
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("notification carries {actual} context values, schema declares {expected}")]
    Arity { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema declares no context fields")]
    Empty,

    #[error("context field at position {0} has a blank name")]
    BlankField(usize),

    #[error("context field '{0}' declared more than once")]
    DuplicateField(String),

    #[error("schema is missing required context field '{0}'")]
    MissingField(String),

    #[error("context field '{field}' declared as {declared}, expected {expected}")]
    WrongKind {
        field: String,
        declared: ValueKind,
        expected: ValueKind,
    },

    #[error("schema has a blank {0}")]
    BlankTrigger(&'static str),
}

/// Failure reported by one of the store collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("entity {entity} has no field '{field}'")]
    FieldNotFound { entity: String, field: String },

    #[error("write rejected for {entity}: {reason}")]
    Rejected { entity: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("subscription already unbound: {0}")]
    Unbound(String),
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlertError>;
