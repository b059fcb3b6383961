//! Event/page orchestration
//!
//! The request scope ([`Ctx`]), the render contract, a small HTML tag
//! builder, event responses and their JSON envelope, client event scripts,
//! and the [`PageHub`] served over axum.

mod context;
mod event;
mod html;
mod hub;
mod render;
mod response;
pub mod server;

#[cfg(test)]
pub mod testing;

pub use context::{Ctx, RequestData, EVENT_FUNC_ID_KEY};
pub use event::{EventBuilder, RELOAD_EVENT};
pub use html::Tag;
pub use hub::{default_layout, EventFn, PageFn, PageHub, RenderedPage};
pub use render::{component, escape_text, render_fn, Component, Fragment, RawHtml, Render, RenderFn, Text};
pub use response::{
    notify_script, EventResponse, Observer, PageResponse, PortalUpdate, PushState, QueryUpdate, RenderedPortal,
    ResponseEnvelope,
};
pub use server::{router, serve, WebError};
