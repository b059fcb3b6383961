//! Per-request scope handed to every render and action method
//!
//! A `Ctx` is built once per HTTP request. Scope markers (active injector,
//! query sync, portal names) are set by deriving a modified copy, so a marker
//! only affects the subtree rendered with that copy.

use crate::stateful::Runtime;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Query key that marks a request as an event
pub const EVENT_FUNC_ID_KEY: &str = "__execute_event__";

/// The parts of an HTTP request that pages and events read
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub path: String,
    pub raw_query: String,
    pub cookies: HashMap<String, String>,
    pub form: HashMap<String, Vec<String>>,
}

impl RequestData {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, raw_query: impl Into<String>) -> Self {
        self.raw_query = raw_query.into();
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_form_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// First form value under `key`
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .get(key)
            .and_then(|vs| vs.first())
            .map(String::as_str)
    }

    pub fn is_event(&self) -> bool {
        self.raw_query.contains(EVENT_FUNC_ID_KEY)
    }

    /// Name of the requested event function, from the query or the form
    pub fn event_func_id(&self) -> Option<String> {
        url::form_urlencoded::parse(self.raw_query.as_bytes())
            .find(|(k, _)| k == EVENT_FUNC_ID_KEY)
            .map(|(_, v)| v.into_owned())
            .or_else(|| self.form_value(EVENT_FUNC_ID_KEY).map(str::to_string))
    }
}

#[derive(Clone)]
pub struct Ctx {
    request: Arc<RequestData>,
    runtime: Arc<Runtime>,
    injector: Option<Arc<str>>,
    sync_query: bool,
    portal_name: Option<Arc<str>>,
    skip_portal: Option<Arc<str>>,
}

impl Ctx {
    pub fn new(runtime: Arc<Runtime>, request: RequestData) -> Self {
        Self {
            request: Arc::new(request),
            runtime,
            injector: None,
            sync_query: false,
            portal_name: None,
            skip_portal: None,
        }
    }

    pub fn request(&self) -> &RequestData {
        &self.request
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    // ─── markers ───

    pub fn injector(&self) -> Option<&str> {
        self.injector.as_deref()
    }

    pub fn with_injector(&self, name: &str) -> Self {
        Self {
            injector: Some(Arc::from(name)),
            ..self.clone()
        }
    }

    pub fn is_sync_query(&self) -> bool {
        self.sync_query
    }

    pub fn with_sync_query(&self) -> Self {
        Self {
            sync_query: true,
            ..self.clone()
        }
    }

    /// Explicit portal name overriding a component's identity
    pub fn portal_name(&self) -> Option<&str> {
        self.portal_name.as_deref()
    }

    pub fn with_portal_name(&self, name: &str) -> Self {
        Self {
            portal_name: Some(Arc::from(name)),
            ..self.clone()
        }
    }

    /// Portal that should render its children bare (the one being replaced)
    pub fn skip_portal(&self) -> Option<&str> {
        self.skip_portal.as_deref()
    }

    pub fn with_skip_portal(&self, name: &str) -> Self {
        Self {
            skip_portal: Some(Arc::from(name)),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("path", &self.request.path)
            .field("injector", &self.injector)
            .field("sync_query", &self.sync_query)
            .field("portal_name", &self.portal_name)
            .field("skip_portal", &self.skip_portal)
            .finish()
    }
}
