//! Todo storage for the demo
//!
//! Components never hold todos in their serialized state; they reach the
//! store through the injector, so every render and action sees the same data.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("todo {0:?} not found")]
    NotFound(String),
}

pub trait Storage: Send + Sync {
    fn list(&self) -> Result<Vec<Todo>, StorageError>;
    /// Store a new todo and return it with its assigned id
    fn create(&self, title: &str) -> Result<Todo, StorageError>;
    fn read(&self, id: &str) -> Result<Todo, StorageError>;
    fn update(&self, todo: &Todo) -> Result<(), StorageError>;
    fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Shared handle resolved from the injectors
pub type Db = Arc<dyn Storage>;

#[derive(Debug, Default)]
struct State {
    todos: Vec<Todo>,
    next_id: u64,
}

/// In-process store; ids are never reused
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn list(&self) -> Result<Vec<Todo>, StorageError> {
        Ok(self.state.read().todos.clone())
    }

    fn create(&self, title: &str) -> Result<Todo, StorageError> {
        let mut state = self.state.write();
        let todo = Todo {
            id: state.next_id.to_string(),
            title: title.to_string(),
            completed: false,
        };
        state.next_id += 1;
        state.todos.push(todo.clone());
        Ok(todo)
    }

    fn read(&self, id: &str) -> Result<Todo, StorageError> {
        self.state
            .read()
            .todos
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn update(&self, todo: &Todo) -> Result<(), StorageError> {
        let mut state = self.state.write();
        let slot = state
            .todos
            .iter_mut()
            .find(|t| t.id == todo.id)
            .ok_or_else(|| StorageError::NotFound(todo.id.clone()))?;
        *slot = todo.clone();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.write();
        let index = state
            .todos
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        state.todos.remove(index);
        Ok(())
    }
}
