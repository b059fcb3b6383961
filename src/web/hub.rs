//! Page and event orchestration
//!
//! A [`PageHub`] owns one page function and the event functions callable
//! from it. Plain requests render the page into the HTML layout; requests
//! naming an event (`__execute_event__`) run that event and answer with the
//! JSON envelope. Full reload and action dispatch are always available.

use super::event::RELOAD_EVENT;
use super::html::Tag;
use super::render::{RawHtml, Render};
use super::response::{EventResponse, PageResponse, ResponseEnvelope};
use super::Ctx;
use crate::stateful::{dispatch, ACTION_FIELD, DISPATCH_EVENT};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type PageFn = Arc<dyn Fn(&Ctx) -> Result<PageResponse> + Send + Sync>;
pub type EventFn = Arc<dyn Fn(&Ctx) -> Result<EventResponse> + Send + Sync>;

/// A rendered page, ready for the layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub title: String,
    pub body: String,
}

#[derive(Clone)]
pub struct PageHub {
    page: PageFn,
    events: HashMap<String, EventFn>,
}

impl fmt::Debug for PageHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.events.keys().collect();
        ids.sort();
        f.debug_struct("PageHub").field("events", &ids).finish()
    }
}

impl PageHub {
    pub fn new<F>(page: F) -> Self
    where
        F: Fn(&Ctx) -> Result<PageResponse> + Send + Sync + 'static,
    {
        Self {
            page: Arc::new(page),
            events: HashMap::new(),
        }
    }

    /// Register an event function; the first registration of an id wins
    pub fn event_func<F>(mut self, id: &str, f: F) -> Self
    where
        F: Fn(&Ctx) -> Result<EventResponse> + Send + Sync + 'static,
    {
        if id == RELOAD_EVENT || id == DISPATCH_EVENT || self.events.contains_key(id) {
            tracing::warn!(event = id, "event function already registered, ignoring");
            return self;
        }
        self.events.insert(id.to_string(), Arc::new(f));
        self
    }

    pub fn render_page(&self, ctx: &Ctx) -> Result<RenderedPage> {
        let page = (self.page)(ctx)?;
        Ok(RenderedPage {
            body: page.body.render(ctx)?,
            title: page.page_title,
        })
    }

    /// Run the event named by the request and render its response
    pub fn execute_event(&self, ctx: &Ctx) -> Result<ResponseEnvelope> {
        let id = ctx
            .request()
            .event_func_id()
            .ok_or_else(|| anyhow!("request does not name an event"))?;

        let (mut response, scope) = match id.as_str() {
            RELOAD_EVENT => (
                EventResponse {
                    reload: true,
                    ..Default::default()
                },
                ctx.clone(),
            ),
            DISPATCH_EVENT => {
                let raw = ctx
                    .request()
                    .form_value(ACTION_FIELD)
                    .ok_or_else(|| anyhow!("form field {ACTION_FIELD} is missing"))?;
                dispatch(ctx, raw)?
            }
            other => {
                let f = self
                    .events
                    .get(other)
                    .ok_or_else(|| anyhow!("event {other} not found"))?;
                (f(ctx)?, ctx.clone())
            }
        };

        if response.reload {
            let page = self.render_page(ctx)?;
            response.body = Some(Arc::new(RawHtml(page.body)));
            if response.page_title.is_empty() {
                response.page_title = page.title;
            }
        }

        response.render(&scope)
    }
}

/// HTML document around a rendered page body
pub fn default_layout(ctx: &Ctx, page: &RenderedPage) -> Result<String> {
    let mut head = Tag::new("head").child(
        Tag::new("meta").attr("charset", "utf-8"),
    );
    if !page.title.is_empty() {
        head = head.child(Tag::new("title").text(page.title.clone()));
    }
    let html = Tag::new("html")
        .child(head)
        .child(
            Tag::new("body").class("front").child(
                Tag::div()
                    .id("app")
                    .flag("v-cloak", true)
                    .child(RawHtml(page.body.clone())),
            ),
        )
        .render(ctx)?;
    Ok(format!("<!DOCTYPE html>\n{html}"))
}
