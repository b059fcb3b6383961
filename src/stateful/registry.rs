//! Component registry
//!
//! Maps wire type keys to constructors for fresh, default component instances.
//! Method tables are bound once per type at registration and shared by every
//! instance the registry creates.

use super::component::{Actionable, MethodTable};
use super::inject::DependencyCenter;
use super::query::extract_tags;
use super::util::merge_json;
use crate::error::{ActionError, ConfigError, InjectError};
use crate::web::{Component, Ctx, EventResponse};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Object-safe view of an actionable instance created from the wire
pub trait DynActionable: Send + Sync {
    fn type_key(&self) -> String;

    /// Unmarshal `state` onto the current value; missing keys keep their values
    fn merge_json(&mut self, state: &Value) -> Result<(), serde_json::Error>;

    fn apply_injector(&mut self, injectors: &DependencyCenter, injector: &str) -> Result<(), InjectError>;

    /// `None` when the type binds no method called `method`
    fn call(&mut self, method: &str, ctx: &Ctx, request: &Value) -> Option<Result<EventResponse, ActionError>>;

    fn identity(&self) -> Option<String>;

    fn to_json(&self) -> serde_json::Result<Value>;

    fn into_component(self: Box<Self>) -> Component;
}

struct Instance<T> {
    value: T,
    methods: Arc<MethodTable<T>>,
}

impl<T: Actionable> DynActionable for Instance<T> {
    fn type_key(&self) -> String {
        T::type_key()
    }

    fn merge_json(&mut self, state: &Value) -> Result<(), serde_json::Error> {
        if state.is_null() {
            return Ok(());
        }
        let mut current = serde_json::to_value(&self.value)?;
        merge_json(&mut current, state);
        self.value = serde_json::from_value(current)?;
        Ok(())
    }

    fn apply_injector(&mut self, injectors: &DependencyCenter, injector: &str) -> Result<(), InjectError> {
        injectors.apply(injector, &mut self.value)
    }

    fn call(&mut self, method: &str, ctx: &Ctx, request: &Value) -> Option<Result<EventResponse, ActionError>> {
        let entry = self.methods.get(method)?;
        Some(entry.invoke(method, &mut self.value, ctx, request))
    }

    fn identity(&self) -> Option<String> {
        self.value.identity()
    }

    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.value)
    }

    fn into_component(self: Box<Self>) -> Component {
        Arc::new(self.value)
    }
}

type Factory = Box<dyn Fn() -> Box<dyn DynActionable> + Send + Sync>;

struct TypeEntry {
    type_name: &'static str,
    factory: Factory,
}

#[derive(Default)]
pub struct ComponentRegistry {
    types: RwLock<HashMap<String, TypeEntry>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.type_keys())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, panicking if its key is taken or its query tags are invalid
    pub fn register<T: Actionable>(&self) {
        if let Err(e) = self.try_register::<T>() {
            panic!("failed to register {}: {e}", std::any::type_name::<T>());
        }
    }

    pub fn try_register<T: Actionable>(&self) -> Result<(), ConfigError> {
        let key = T::type_key();
        let mut types = self.types.write();
        if types.contains_key(&key) {
            return Err(ConfigError::DuplicateType(key));
        }

        // contradictory tags are a setup mistake; surface them now
        extract_tags::<T>()?;

        let mut table = MethodTable::<T>::new();
        T::methods(&mut table);
        tracing::debug!(type_key = %key, methods = ?table.names(), "registered actionable type");

        let methods = Arc::new(table);
        types.insert(
            key,
            TypeEntry {
                type_name: std::any::type_name::<T>(),
                factory: Box::new(move || {
                    Box::new(Instance {
                        value: T::default(),
                        methods: methods.clone(),
                    })
                }),
            },
        );
        Ok(())
    }

    /// A fresh default instance of the type registered under `key`
    pub fn new_instance(&self, key: &str) -> Result<Box<dyn DynActionable>, ActionError> {
        let types = self.types.read();
        let entry = types
            .get(key)
            .ok_or_else(|| ActionError::TypeNotFound(key.to_string()))?;
        Ok((entry.factory)())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.read().contains_key(key)
    }

    pub fn type_name(&self, key: &str) -> Option<&'static str> {
        self.types.read().get(key).map(|e| e.type_name)
    }

    pub fn type_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.types.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
