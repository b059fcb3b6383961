//! Render contract shared by pages, components and portal bodies

use super::Ctx;
use std::sync::Arc;

/// Anything that can produce HTML for a request scope
pub trait Render: Send + Sync {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String>;
}

/// Shared, type-erased renderable
pub type Component = Arc<dyn Render>;

impl<R: Render + ?Sized> Render for Arc<R> {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        (**self).render(ctx)
    }
}

impl<R: Render + ?Sized> Render for Box<R> {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        (**self).render(ctx)
    }
}

impl<R: Render> Render for Option<R> {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        match self {
            Some(r) => r.render(ctx),
            None => Ok(String::new()),
        }
    }
}

/// Adapter for closures
pub struct RenderFn<F>(pub F);

impl<F> Render for RenderFn<F>
where
    F: Fn(&Ctx) -> anyhow::Result<String> + Send + Sync,
{
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        (self.0)(ctx)
    }
}

pub fn render_fn<F>(f: F) -> Component
where
    F: Fn(&Ctx) -> anyhow::Result<String> + Send + Sync + 'static,
{
    Arc::new(RenderFn(f))
}

pub fn component<R: Render + 'static>(r: R) -> Component {
    Arc::new(r)
}

/// Pre-rendered markup, emitted verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHtml(pub String);

impl Render for RawHtml {
    fn render(&self, _ctx: &Ctx) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Escaped text node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text(pub String);

impl Render for Text {
    fn render(&self, _ctx: &Ctx) -> anyhow::Result<String> {
        Ok(escape_text(&self.0))
    }
}

/// Children rendered back to back
#[derive(Clone, Default)]
pub struct Fragment(pub Vec<Component>);

impl Render for Fragment {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        let mut out = String::new();
        for child in &self.0 {
            out.push_str(&child.render(ctx)?);
        }
        Ok(out)
    }
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
