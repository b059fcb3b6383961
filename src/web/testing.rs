//! Router test harness
//!
//! Builds page and event requests (events as multipart forms, the way the
//! browser runtime posts them), runs them through a router and checks the
//! rendered page or the decoded event envelope.

use super::{ResponseEnvelope, EVENT_FUNC_ID_KEY};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

const BOUNDARY: &str = "plaid-test-boundary";

/// Event request posted as `multipart/form-data`
#[derive(Debug, Default)]
pub struct MultipartBuilder {
    page_url: String,
    event_func: String,
    fields: Vec<(String, String)>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self {
            page_url: "/".into(),
            ..Default::default()
        }
    }

    pub fn page_url(mut self, url: &str) -> Self {
        self.page_url = url.to_string();
        self
    }

    pub fn event_func(mut self, id: &str) -> Self {
        self.event_func = id.to_string();
        self
    }

    pub fn add_field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Request<Body> {
        let separator = if self.page_url.contains('?') { '&' } else { '?' };
        let uri = format!(
            "{}{}{}={}",
            self.page_url,
            separator,
            EVENT_FUNC_ID_KEY,
            urlencoding::encode(&self.event_func)
        );

        let mut body = String::new();
        for (name, value) in &self.fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("valid test request")
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("valid test request")
}

/// Expectations for one request
#[derive(Default)]
pub struct TestCase {
    pub name: &'static str,
    pub expect_page_body_contains_in_order: Vec<&'static str>,
    pub expect_page_body_not_contains: Vec<&'static str>,
    pub expect_portal_update0_contains_in_order: Vec<&'static str>,
    pub expect_portal_update0_not_contains: Vec<&'static str>,
    pub expect_run_script_contains_in_order: Vec<&'static str>,
    pub event_response_match: Option<Box<dyn Fn(&ResponseEnvelope)>>,
}

pub fn contains_in_order(mut body: &str, candidates: &[&str]) -> bool {
    for candidate in candidates {
        match body.find(candidate) {
            Some(i) => body = &body[i + candidate.len()..],
            None => return false,
        }
    }
    true
}

/// Run `request` through `app` and check `case` against the response
///
/// Returns the decoded envelope for event responses.
pub async fn run_case(app: Router, case: TestCase, request: Request<Body>) -> Option<ResponseEnvelope> {
    let name = case.name;
    let resp = app.oneshot(request).await.expect("router is infallible");
    let status = resp.status();
    let is_json = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let body = String::from_utf8_lossy(&bytes).into_owned();
    assert_eq!(status, StatusCode::OK, "[{name}] unexpected status, body: {body}");

    if !case.expect_page_body_contains_in_order.is_empty() {
        assert!(
            contains_in_order(&body, &case.expect_page_body_contains_in_order),
            "[{name}] page body {body} should contain in order: {:?}",
            case.expect_page_body_contains_in_order
        );
    }
    for v in &case.expect_page_body_not_contains {
        assert!(!body.contains(v), "[{name}] page body {body} should not contain: {v}");
    }

    if !is_json {
        return None;
    }
    let envelope: ResponseEnvelope = serde_json::from_str(&body)
        .unwrap_or_else(|e| panic!("[{name}] {e} for: {body}"));

    if let Some(check) = &case.event_response_match {
        check(&envelope);
    }
    if !case.expect_run_script_contains_in_order.is_empty() {
        assert!(
            contains_in_order(&envelope.run_script, &case.expect_run_script_contains_in_order),
            "[{name}] runScript {} should contain in order: {:?}",
            envelope.run_script,
            case.expect_run_script_contains_in_order
        );
    }

    let needs_portal = !case.expect_portal_update0_contains_in_order.is_empty()
        || !case.expect_portal_update0_not_contains.is_empty();
    if needs_portal {
        let portal = envelope
            .update_portals
            .first()
            .unwrap_or_else(|| panic!("[{name}] no update portals in {body}"));
        assert!(
            contains_in_order(&portal.body, &case.expect_portal_update0_contains_in_order),
            "[{name}] portal {} should contain in order: {:?}",
            portal.body,
            case.expect_portal_update0_contains_in_order
        );
        for v in &case.expect_portal_update0_not_contains {
            assert!(!portal.body.contains(v), "[{name}] portal {} should not contain: {v}", portal.body);
        }
    }

    Some(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_in_order() {
        assert!(contains_in_order("a b c", &["a", "c"]));
        assert!(!contains_in_order("a b c", &["c", "a"]));
        assert!(contains_in_order("anything", &[]));
    }

    #[test]
    fn test_multipart_request_shape() {
        let req = MultipartBuilder::new()
            .page_url("/todos?x=1")
            .event_func("__reload__")
            .add_field("a", "1")
            .build();
        assert_eq!(req.uri(), "/todos?x=1&__execute_event__=__reload__");
        assert!(req.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
    }
}
