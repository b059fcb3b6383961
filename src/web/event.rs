//! Client event scripts
//!
//! Builds the `plaid()...go()` call chains the browser runtime executes on
//! user interaction. Scripts are opaque strings to the server.

use serde_json::Value;
use std::fmt;

/// Built-in event: re-render the whole page
pub const RELOAD_EVENT: &str = "__reload__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuilder {
    calls: Vec<String>,
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

impl EventBuilder {
    /// `plaid()` bound to the surrounding scope's `vars`, `locals` and `form`
    pub fn plaid() -> Self {
        Self {
            calls: vec![
                "vars(vars)".to_string(),
                "locals(locals)".to_string(),
                "form(form)".to_string(),
            ],
        }
    }

    pub fn post() -> Self {
        Self::plaid().method("POST")
    }

    fn call(mut self, name: &str, args: impl Into<String>) -> Self {
        self.calls.push(format!("{}({})", name, args.into()));
        self
    }

    pub fn method(self, method: &str) -> Self {
        self.call("method", js_string(method))
    }

    pub fn event_func(self, id: &str) -> Self {
        self.call("eventFunc", js_string(id))
    }

    pub fn url(self, url: &str) -> Self {
        self.call("url", js_string(url))
    }

    /// Replace the query sent with the event
    ///
    /// Takes an already-built JSON value, so writing it out cannot fail.
    pub fn queries(self, queries: &Value) -> Self {
        self.call("queries", queries.to_string())
    }

    /// Run a JS function `function(b) {...}` before anything else
    pub fn run(self, js: impl Into<String>) -> Self {
        self.call("run", js)
    }

    /// JS expression producing the raw query string
    pub fn string_query(self, js: impl Into<String>) -> Self {
        self.call("stringQuery", js)
    }

    /// JS expression deciding whether to push browser history
    pub fn push_state(self, js: impl Into<String>) -> Self {
        self.call("pushState", js)
    }

    /// JS hook `({b, url, opts}) => [url, opts]` invoked before fetching
    pub fn before_fetch(self, js: impl Into<String>) -> Self {
        self.call("beforeFetch", js)
    }

    pub fn go(&self) -> String {
        format!("plaid().{}.go()", self.calls.join("."))
    }
}

impl fmt::Display for EventBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.go())
    }
}
