//! Reload and portal reconciliation
//!
//! Identifiable components render inside a `go-plaid-portal` named after
//! their identity. Reloading one sends its state back under the reserved
//! `OnReload` method; the response replaces the portal content with a fresh
//! render that skips the portal wrapper, since the client already has it
//! mounted.
//!
//! [`reload_action`] can also describe a local change: the component is
//! cloned, mutated and diffed, and the client applies the resulting JSON
//! Patch to its own copy of the state before posting it.

use super::action::{post_action, PostActionOptions};
use super::component::{Actionable, RELOAD_METHOD};
use super::util::clone_via_json;
use crate::error::ActionError;
use crate::web::{Component, Ctx, EventBuilder, EventResponse, Render, Tag};
use serde_json::{json, Value};
use std::sync::Arc;

/// Children wrapped in a portal named after an identity
struct Portalize {
    identity: String,
    children: Vec<Component>,
}

impl Render for Portalize {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        let name = ctx.portal_name().unwrap_or(&self.identity);
        if ctx.skip_portal() == Some(name) {
            let mut out = String::new();
            for child in &self.children {
                out.push_str(&child.render(ctx)?);
            }
            return Ok(out);
        }
        Tag::new("go-plaid-portal")
            .attr(":visible", "true")
            .attr("portal-name", name)
            .children(self.children.iter().cloned())
            .render(ctx)
    }
}

pub fn portalize(identity: impl Into<String>, children: Vec<Component>) -> Component {
    Arc::new(Portalize {
        identity: identity.into(),
        children,
    })
}

/// Renders a component without its own portal wrapper
struct SkipPortal {
    identity: String,
    component: Component,
}

impl Render for SkipPortal {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        let name = ctx.portal_name().unwrap_or(&self.identity).to_string();
        self.component.render(&ctx.with_skip_portal(&name))
    }
}

fn skip_portal(identity: String, component: Component) -> Component {
    Arc::new(SkipPortal {
        identity,
        component,
    })
}

fn identity_of<C: Actionable>(component: &C) -> Result<String, ActionError> {
    component
        .identity()
        .ok_or_else(|| ActionError::NotIdentifiable(C::type_key()))
}

pub fn skip_portalize<C: Actionable>(component: C) -> Result<Component, ActionError> {
    let identity = identity_of(&component)?;
    Ok(skip_portal(identity, Arc::new(component)))
}

/// Portal update re-rendering `component` in place
pub(crate) fn reload_response(identity: String, component: Component) -> EventResponse {
    let mut r = EventResponse::new();
    r.update_portal(identity.clone(), skip_portal(identity, component));
    r
}

pub fn on_reload<C: Actionable>(component: C) -> Result<EventResponse, ActionError> {
    let identity = identity_of(&component)?;
    Ok(reload_response(identity, Arc::new(component)))
}

/// Add a portal update for `component` to an existing response
pub fn append_reload<C: Actionable>(r: &mut EventResponse, component: C) -> Result<(), ActionError> {
    let identity = identity_of(&component)?;
    r.update_portal(identity.clone(), skip_portal(identity, Arc::new(component)));
    Ok(())
}

/// Client script reloading `source`, optionally after a local change
///
/// # Panics
/// If the component state cannot be serialized.
pub fn reload_action<T: Actionable>(
    ctx: &Ctx,
    source: &T,
    mutate: Option<&dyn Fn(&mut T)>,
    mut opts: PostActionOptions,
) -> EventBuilder {
    let request = json!({});
    let Some(mutate) = mutate else {
        return post_action(ctx, source, RELOAD_METHOD, &request, opts);
    };

    let mut target = match clone_via_json(source) {
        Ok(target) => target,
        Err(e) => panic!("failed to clone {} for reload: {e}", T::type_key()),
    };
    mutate(&mut target);
    if opts.use_provided_component {
        return post_action(ctx, &target, RELOAD_METHOD, &request, opts);
    }

    let patch = json_patch::diff(&snapshot(source), &snapshot(&target));
    if patch.0.is_empty() {
        return post_action(ctx, &target, RELOAD_METHOD, &request, opts);
    }
    let patch = match serde_json::to_string(&patch) {
        Ok(patch) => patch,
        Err(e) => panic!("failed to serialize reload patch: {e}"),
    };
    opts.fixes
        .insert(0, format!("b.applyJsonPatch(v.actionable, {patch});"));
    post_action(ctx, &target, RELOAD_METHOD, &request, opts)
}

fn snapshot<T: Actionable>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => panic!("failed to serialize {} for reload: {e}", T::type_key()),
    }
}
