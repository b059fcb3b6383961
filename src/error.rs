//! Typed errors for the stateful action protocol
//!
//! Configuration mistakes (duplicate registrations, contradictory query tags)
//! surface at setup time. Everything that can go wrong while handling an
//! action funnels into [`ActionError`], which is what the dispatcher returns.

use thiserror::Error;

/// Setup-time errors: registering types and injectors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("actionable type {0:?} is already registered")]
    DuplicateType(String),

    #[error("injector name is required")]
    EmptyInjectorName,

    #[error("injector {0:?} already exists")]
    DuplicateInjector(String),

    #[error("parent injector {0:?} not found")]
    ParentNotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Query tag extraction and URL encode/decode errors
///
/// Cloneable so extraction failures can be cached alongside successes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{type_name}: expected a struct shape, got {got}")]
    NotStruct { type_name: String, got: &'static str },

    #[error("{type_name}: embedded field {field:?} cannot carry a query tag")]
    EmbeddedQueryTag { type_name: String, field: String },

    #[error("{type_name}: field {field:?} has a query tag but is not serialized")]
    PrivateField { type_name: String, field: String },

    #[error("{type_name}: field {field:?} has a query tag but is ignored by json")]
    JsonIgnored { type_name: String, field: String },

    #[error("{type_name}: field {field:?} has a malformed query method")]
    InvalidMethod { type_name: String, field: String },

    #[error("{type_name}: field {field:?} has an empty query method")]
    EmptyMethod { type_name: String, field: String },

    #[error("query method {0:?} not found")]
    UnknownMethod(String),

    #[error("query method {method:?} on {field:?} requires an argument")]
    MissingMethodArg { method: &'static str, field: String },

    #[error("query contains an invalid segment: {0:?}")]
    InvalidQuery(String),

    #[error("failed to unescape {0:?}")]
    Unescape(String),

    #[error("cannot parse {value:?} as {expected} for {field:?}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("field {0:?} holds a value that cannot be written to a query")]
    Unencodable(String),

    #[error("query-tagged field {0:?} has no accessor to decode into")]
    Unassignable(String),

    #[error("field {field:?} belongs to {expected}, not the decoded value")]
    TargetMismatch { field: String, expected: &'static str },

    #[error("json conversion failed: {0}")]
    Json(String),

    #[error("query decode panicked: {0}")]
    Panic(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Json(err.to_string())
    }
}

/// Dependency injection errors
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("injector {0:?} not found")]
    InjectorNotFound(String),

    #[error("injector {injector:?}: no provider for {key}")]
    Unresolved { injector: String, key: String },

    #[error("injector {injector:?}: {key} is already provided")]
    DuplicateProvider { injector: String, key: String },

    #[error("injector {injector:?}: dependency cycle {path}")]
    Cycle { injector: String, path: String },

    #[error("injector {injector:?}: provider for {key} failed")]
    Provider {
        injector: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} was read before it was injected")]
    NotInjected(&'static str),
}

/// Everything the dispatcher can fail with
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to decode action: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("actionable type {0:?} not found")]
    TypeNotFound(String),

    #[error("failed to decode state of {type_key}: {source}")]
    State {
        type_key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("action method {method:?} has an incorrect signature: {reason}")]
    Signature { method: String, reason: String },

    #[error("failed to decode request of {method:?} into {type_name}: {source}")]
    Request {
        method: String,
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("action method {method:?} failed: {source}")]
    Method {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} is not identifiable")]
    NotIdentifiable(String),

    #[error("action method {0:?} not found")]
    MethodNotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}
