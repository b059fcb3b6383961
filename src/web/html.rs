//! Minimal tag builder
//!
//! Just enough HTML for scope/portal wrappers, the default layout and the demo
//! views. Attribute values are single-quoted; classes render after all other
//! attributes.

use super::render::{escape_text, Component, Render, Text};
use super::Ctx;
use std::borrow::Cow;
use std::sync::Arc;

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "link", "meta"];

#[derive(Clone)]
pub struct Tag {
    name: Cow<'static, str>,
    attrs: Vec<(String, Option<String>)>,
    classes: Vec<String>,
    children: Vec<Component>,
}

macro_rules! tag_constructors {
    ($($fn_name:ident),*) => {
        $(pub fn $fn_name() -> Self {
            Self::new(stringify!($fn_name))
        })*
    };
}

impl Tag {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            classes: Vec::new(),
            children: Vec::new(),
        }
    }

    tag_constructors!(a, button, div, footer, h1, header, input, label, li, section, span, strong, ul);

    /// Set (or replace) an attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = Some(value.into());
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
        self
    }

    /// Valueless attribute, present only when `on`
    pub fn flag(mut self, key: impl Into<String>, on: bool) -> Self {
        let key = key.into();
        self.attrs.retain(|(k, _)| *k != key);
        if on {
            self.attrs.push((key, None));
        }
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn class_if(self, class: &str, on: bool) -> Self {
        if on {
            self.class(class)
        } else {
            self
        }
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn style(self, style: &str) -> Self {
        self.attr("style", style)
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Text(text.into()))
    }

    pub fn child(mut self, child: impl Render + 'static) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Component>) -> Self {
        self.children.extend(children);
        self
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('\'', "&#39;")
}

impl Render for Tag {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        let mut out = format!("<{}", self.name);
        for (key, value) in &self.attrs {
            match value {
                Some(v) => out.push_str(&format!(" {}='{}'", escape_text(key), escape_attr(v))),
                None => out.push_str(&format!(" {}", escape_text(key))),
            }
        }
        if !self.classes.is_empty() {
            out.push_str(&format!(" class='{}'", escape_attr(&self.classes.join(" "))));
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&&*self.name) {
            return Ok(out);
        }
        for child in &self.children {
            out.push_str(&child.render(ctx)?);
        }
        out.push_str(&format!("</{}>", self.name));
        Ok(out)
    }
}
