//! URL and cookie query-state synchronization
//!
//! A component wrapped in `SyncQuery` picks its tagged fields up from the
//! request before rendering: cookie-tagged fields from the component's sync
//! cookie first, then every tagged field from the URL query. Actions posted
//! from inside the wrapper carry `sync_query`, so the client keeps the URL and
//! cookie in step with the state.

use super::component::Actionable;
use super::inject::{Injectable, Resolver};
use super::query::extract_tags;
use super::util::short_hash;
use crate::error::InjectError;
use crate::web::{Ctx, Render};

/// Cookie holding the cookie-tagged fields of an identifiable component
pub fn sync_cookie_key<C: Actionable>(component: &C) -> String {
    let identity = component.identity().unwrap_or_default();
    format!(
        "__sync_cookie_{}__",
        short_hash(&format!("{}:{}", C::type_key(), identity))
    )
}

#[derive(Debug, Clone, Default)]
pub struct SyncQuery<C> {
    component: C,
}

impl<C> SyncQuery<C> {
    pub fn new(component: C) -> Self {
        Self { component }
    }

    pub fn inner(&self) -> &C {
        &self.component
    }
}

impl<C: Actionable> Render for SyncQuery<C> {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        let tags = extract_tags::<C>()?;
        let mut component = self.component.clone();

        if component.identity().is_some() {
            if let Some(cookie) = ctx.request().cookie(&sync_cookie_key(&component)) {
                tags.cookie_tags().decode(cookie, &mut component)?;
            }
        }
        tags.decode(&ctx.request().raw_query, &mut component)?;

        component.render(&ctx.with_sync_query())
    }
}

impl<C: Injectable> Injectable for SyncQuery<C> {
    fn inject(&mut self, resolver: &mut Resolver<'_>) -> Result<(), InjectError> {
        self.component.inject(resolver)
    }
}
