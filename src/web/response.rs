//! Page and event responses
//!
//! Handlers build an [`EventResponse`] holding renderable components. The
//! orchestration layer renders it in the request scope into a
//! [`ResponseEnvelope`], the JSON the browser runtime consumes.

use super::render::Component;
use super::Ctx;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Client script delivering `payload` to every scope observing `name`
pub fn notify_script(name: &str, payload: &Value) -> String {
    format!(
        "vars.__sendNotification({}, {})",
        Value::String(name.to_string()),
        payload
    )
}

/// Scope-level listener for a notification sent with [`notify_script`]
///
/// The script sees `name`, `payload`, `vars`, `locals`, `form` and `plaid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    pub name: String,
    pub script: String,
}

impl Observer {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
        }
    }
}

/// Response of a page request
#[derive(Clone)]
pub struct PageResponse {
    pub page_title: String,
    pub body: Component,
}

/// Browser history update requested by an event
///
/// Serialized as-is for the client's location handling; build it with the
/// chained setters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushState {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merge_query: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub string_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear_merge_query_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, QueryUpdate>,
}

/// New values for one query key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryUpdate {
    /// Replace the key's values
    Put(Vec<String>),
    /// Add or remove individual values while merging
    Merge {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        add: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        remove: bool,
    },
}

impl PushState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn merge_query(mut self, merge: bool) -> Self {
        self.merge_query = merge;
        self
    }

    /// Replace the values of `key`
    pub fn put_query(mut self, key: impl Into<String>, values: &[&str]) -> Self {
        self.query
            .insert(key.into(), QueryUpdate::Put(to_strings(values)));
        self
    }

    /// Merge into the current query, appending `values` to `key`
    pub fn merge_with_append(self, key: impl Into<String>, values: &[&str]) -> Self {
        self.merge_op(key.into(), values, true)
    }

    /// Merge into the current query, removing `values` from `key`
    pub fn merge_with_remove(self, key: impl Into<String>, values: &[&str]) -> Self {
        self.merge_op(key.into(), values, false)
    }

    fn merge_op(mut self, key: String, values: &[&str], add: bool) -> Self {
        self.merge_query = true;
        self.query.insert(
            key,
            QueryUpdate::Merge {
                values: to_strings(values),
                add,
                remove: !add,
            },
        );
        self
    }

    /// Raw query string, used as-is by the client
    pub fn string_query(mut self, query: impl Into<String>) -> Self {
        self.string_query = query.into();
        self
    }

    /// Keys dropped from the current query before merging
    pub fn clear_merge_query(mut self, keys: &[&str]) -> Self {
        self.clear_merge_query_keys = to_strings(keys);
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Replacement content for one mounted portal
#[derive(Clone)]
pub struct PortalUpdate {
    pub name: String,
    pub body: Component,
    pub after_loaded: String,
}

impl fmt::Debug for PortalUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalUpdate")
            .field("name", &self.name)
            .field("after_loaded", &self.after_loaded)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct EventResponse {
    pub page_title: String,
    pub body: Option<Component>,
    /// Re-render the whole page body
    pub reload: bool,
    pub push_state: Option<PushState>,
    pub redirect_url: String,
    pub reload_portals: Vec<String>,
    pub update_portals: Vec<PortalUpdate>,
    pub data: Option<Value>,
    pub run_script: String,
}

// component bodies are opaque until rendered
impl fmt::Debug for EventResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventResponse")
            .field("page_title", &self.page_title)
            .field("has_body", &self.body.is_some())
            .field("reload", &self.reload)
            .field("push_state", &self.push_state)
            .field("redirect_url", &self.redirect_url)
            .field("reload_portals", &self.reload_portals)
            .field("update_portals", &self.update_portals)
            .field("data", &self.data)
            .field("run_script", &self.run_script)
            .finish()
    }
}

impl EventResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append scripts, joined with `"; "`
    pub fn append_run_script(&mut self, script: impl Into<String>) {
        let script = script.into();
        if self.run_script.is_empty() {
            self.run_script = script;
        } else {
            self.run_script = format!("{}; {}", self.run_script, script);
        }
    }

    /// Broadcast a named notification to scope observers on the page
    pub fn emit(&mut self, name: &str, payload: &Value) {
        self.append_run_script(notify_script(name, payload));
    }

    pub fn update_portal(&mut self, name: impl Into<String>, body: Component) {
        self.update_portals.push(PortalUpdate {
            name: name.into(),
            body,
            after_loaded: String::new(),
        });
    }

    /// Render every component into the wire envelope
    pub fn render(&self, ctx: &Ctx) -> anyhow::Result<ResponseEnvelope> {
        let body = match &self.body {
            Some(body) => body.render(ctx)?,
            None => String::new(),
        };
        let update_portals = self
            .update_portals
            .iter()
            .map(|p| {
                Ok(RenderedPortal {
                    name: p.name.clone(),
                    body: p.body.render(ctx)?,
                    after_loaded: p.after_loaded.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ResponseEnvelope {
            page_title: self.page_title.clone(),
            body,
            reload: self.reload,
            push_state: self.push_state.clone(),
            redirect_url: self.redirect_url.clone(),
            reload_portals: self.reload_portals.clone(),
            update_portals,
            data: self.data.clone(),
            run_script: self.run_script.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPortal {
    pub name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub after_loaded: String,
}

/// JSON body of an event response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub page_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reload: bool,
    #[serde(default)]
    pub push_state: Option<PushState>,
    #[serde(
        rename = "redirectURL",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub redirect_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reload_portals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_portals: Vec<RenderedPortal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_script: String,
}
