//! TodoMVC demo
//!
//! Served by the binary when `demo.enabled` is set, and used by the router
//! tests as an end-to-end exercise of actions, injectors, query sync and
//! portal reloads.

pub mod storage;
pub mod todomvc;


use crate::stateful::Runtime;
use crate::web::{self, PageHub};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;

pub use storage::{Db, MemoryStorage, Storage, StorageError, Todo};
pub use todomvc::{install, todomvc_page, TodoApp, TodoAppDep, TodoItem};

/// Fresh runtime with the demo installed, serving the TodoMVC page on every path
pub fn router(max_form_size: usize) -> Result<Router> {
    let runtime = Runtime::new();
    install(&runtime)?;
    tracing::debug!(types = ?runtime.registry().type_keys(), "demo installed");
    Ok(web::router(
        Arc::new(runtime),
        PageHub::new(todomvc_page),
        max_form_size,
    ))
}
