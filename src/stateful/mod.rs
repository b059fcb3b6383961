//! Stateful action protocol
//!
//! Components are serialized into the page, sent back with an action when the
//! user interacts, rebuilt from the [`ComponentRegistry`], injected from the
//! [`DependencyCenter`] and finally asked to run a named method. The
//! [`Runtime`] bundles both process-wide registries.

pub mod action;
pub mod component;
pub mod inject;
pub mod query;
pub mod registry;
pub mod reload;
pub mod sync_query;
pub mod util;

pub use action::{actionable, actionable_observing, dispatch, post_action, Action, PostActionOptions, ACTION_FIELD, DISPATCH_EVENT};
pub use component::{Actionable, MethodTable, Output, Param, Signature, RELOAD_METHOD};
pub use inject::{Constructor, DependencyCenter, Inject, Injectable, Injected, InjectorName, Resolver};
pub use registry::{ComponentRegistry, DynActionable};
pub use reload::{append_reload, on_reload, portalize, reload_action, skip_portalize};
pub use sync_query::{sync_cookie_key, SyncQuery};

/// Process-wide state shared by every request
#[derive(Debug, Default)]
pub struct Runtime {
    registry: ComponentRegistry,
    injectors: DependencyCenter,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn injectors(&self) -> &DependencyCenter {
        &self.injectors
    }
}
