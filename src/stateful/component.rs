//! Actionable components and their method tables
//!
//! An actionable component is a serializable value that can render itself
//! and expose named methods callable from the browser. Methods are bound
//! into a [`MethodTable`] once, when the type is registered; each binding
//! carries a [`Signature`] that the dispatcher validates before invoking it.

use super::inject::Injectable;
use super::query::Reflect;
use crate::error::ActionError;
use crate::web::{Ctx, EventResponse, Render};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Method name that falls back to re-rendering an identifiable component
pub const RELOAD_METHOD: &str = "OnReload";

pub trait Actionable:
    Render + Injectable + Reflect + Serialize + DeserializeOwned + Default + Clone + 'static
{
    /// Key identifying the type on the wire
    fn type_key() -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Bind the methods callable from the browser
    fn methods(table: &mut MethodTable<Self>) {
        let _ = table;
    }

    /// Compound identity (`"TodoApp:TodoApp0"`) of identifiable components,
    /// used as portal name and reload key
    fn identity(&self) -> Option<String> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signatures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// The request scope
    Context,
    /// Payload decoded from the action's `request`
    Request(&'static str),
    Other(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Response,
    Error,
    Other(&'static str),
}

/// Declared shape of a bound method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub outputs: Vec<Output>,
}

impl Signature {
    pub fn context_only() -> Self {
        Self {
            params: vec![Param::Context],
            outputs: vec![Output::Response, Output::Error],
        }
    }

    pub fn with_request<R>() -> Self {
        Self {
            params: vec![Param::Context, Param::Request(std::any::type_name::<R>())],
            outputs: vec![Output::Response, Output::Error],
        }
    }

    /// Callable signatures take the context, optionally a request payload,
    /// and return exactly a response and an error
    pub fn validate(&self) -> Result<(), String> {
        if self.outputs != [Output::Response, Output::Error] {
            return Err(format!("returns {:?}, expected (response, error)", self.outputs));
        }
        if self.params.is_empty() || self.params.len() > 2 {
            return Err(format!("takes {} arguments, expected 1 or 2", self.params.len()));
        }
        if self.params[0] != Param::Context {
            return Err(format!("first argument is {:?}, expected the context", self.params[0]));
        }
        if let Some(second) = self.params.get(1) {
            if !matches!(second, Param::Request(_)) {
                return Err(format!("second argument is {second:?}, expected a request"));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Method table
// ─────────────────────────────────────────────────────────────────────────────

type Handler<T> =
    Arc<dyn Fn(&mut T, &Ctx, &Value) -> Result<EventResponse, ActionError> + Send + Sync>;

pub struct MethodEntry<T> {
    pub signature: Signature,
    handler: Handler<T>,
}

impl<T> MethodEntry<T> {
    /// Validate the signature, then call; an invalid binding is never invoked
    pub fn invoke(
        &self,
        method: &str,
        target: &mut T,
        ctx: &Ctx,
        request: &Value,
    ) -> Result<EventResponse, ActionError> {
        self.signature
            .validate()
            .map_err(|reason| ActionError::Signature {
                method: method.to_string(),
                reason,
            })?;
        (self.handler)(target, ctx, request)
    }
}

pub struct MethodTable<T> {
    entries: HashMap<String, MethodEntry<T>>,
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> fmt::Debug for MethodTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("MethodTable").field("methods", &names).finish()
    }
}

impl<T: 'static> MethodTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, signature: Signature, handler: Handler<T>) -> &mut Self {
        if self.entries.contains_key(name) {
            panic!(
                "method {name:?} bound twice on {}",
                std::any::type_name::<T>()
            );
        }
        self.entries
            .insert(name.to_string(), MethodEntry { signature, handler });
        self
    }

    /// Bind a method taking only the request scope
    pub fn method<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut T, &Ctx) -> anyhow::Result<EventResponse> + Send + Sync + 'static,
    {
        let method = name.to_string();
        self.insert(
            name,
            Signature::context_only(),
            Arc::new(move |target: &mut T, ctx: &Ctx, _request: &Value| {
                f(target, ctx).map_err(|source| ActionError::Method {
                    method: method.clone(),
                    source,
                })
            }),
        )
    }

    /// Bind a method taking a typed request payload
    ///
    /// A `null` request decodes like an empty object.
    pub fn method_with<R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        R: DeserializeOwned + 'static,
        F: Fn(&mut T, &Ctx, R) -> anyhow::Result<EventResponse> + Send + Sync + 'static,
    {
        let method = name.to_string();
        self.insert(
            name,
            Signature::with_request::<R>(),
            Arc::new(move |target: &mut T, ctx: &Ctx, request: &Value| {
                let payload = if request.is_null() {
                    serde_json::from_value::<R>(Value::Object(Default::default()))
                } else {
                    serde_json::from_value::<R>(request.clone())
                };
                let payload = payload.map_err(|source| ActionError::Request {
                    method: method.clone(),
                    type_name: std::any::type_name::<R>(),
                    source,
                })?;
                f(target, ctx, payload).map_err(|source| ActionError::Method {
                    method: method.clone(),
                    source,
                })
            }),
        )
    }

    /// Bind a handler with an explicitly described signature
    ///
    /// The raw `request` JSON is passed through untouched.
    pub fn raw<F>(&mut self, name: &str, signature: Signature, f: F) -> &mut Self
    where
        F: Fn(&mut T, &Ctx, &Value) -> anyhow::Result<EventResponse> + Send + Sync + 'static,
    {
        let method = name.to_string();
        self.insert(
            name,
            signature,
            Arc::new(move |target: &mut T, ctx: &Ctx, request: &Value| {
                f(target, ctx, request).map_err(|source| ActionError::Method {
                    method: method.clone(),
                    source,
                })
            }),
        )
    }

    pub fn get(&self, name: &str) -> Option<&MethodEntry<T>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
