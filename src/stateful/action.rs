//! Action envelope and dispatcher
//!
//! The server half decodes an [`Action`] posted by the browser, rebuilds the
//! component it names and calls the requested method. The client half is
//! generated here too: [`actionable`] wraps a component's markup in a scope
//! holding its serialized state, and [`post_action`] builds the script that
//! posts an action from inside that scope.

use super::component::{Actionable, RELOAD_METHOD};
use super::query::{extract_tags, QUERY_METHODS};
use super::reload::{portalize, reload_response};
use super::sync_query::sync_cookie_key;
use super::util::pretty_json;
use crate::error::{ActionError, QueryError};
use crate::web::{Component, Ctx, EventBuilder, EventResponse, Observer, Tag};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Event id every action is posted under
pub const DISPATCH_EVENT: &str = "__dispatch_actionable_action__";

/// Form field carrying the action JSON
pub const ACTION_FIELD: &str = "__action__";

const LOCALS_NEW_ACTION: &str = "newAction";
const LOCALS_QUERY_TAGS: &str = "queryTags";
const LOCALS_SET_COOKIES: &str = "setCookies";
const LOCALS_ENCODE_QUERY: &str = "encodeQuery";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub actionable_type: String,
    #[serde(default)]
    pub actionable: Value,
    #[serde(default)]
    pub injector: String,
    #[serde(default)]
    pub sync_query: bool,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub request: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Decode and run one action
///
/// Returns the method's response together with the scope it ran in, so the
/// response can be rendered with the same injector and sync markers.
pub fn dispatch(ctx: &Ctx, raw: &str) -> Result<(EventResponse, Ctx), ActionError> {
    let action: Action = serde_json::from_str(raw).map_err(ActionError::Decode)?;
    let runtime = ctx.runtime().clone();

    let mut instance = runtime.registry().new_instance(&action.actionable_type)?;
    instance
        .merge_json(&action.actionable)
        .map_err(|source| ActionError::State {
            type_key: action.actionable_type.clone(),
            source,
        })?;

    let mut scope = ctx.clone();
    if !action.injector.is_empty() {
        scope = scope.with_injector(&action.injector);
        instance.apply_injector(runtime.injectors(), &action.injector)?;
    }
    if action.sync_query {
        scope = scope.with_sync_query();
    }

    tracing::debug!(
        actionable_type = %action.actionable_type,
        method = %action.method,
        injector = %action.injector,
        sync_query = action.sync_query,
        "dispatching action"
    );

    if let Some(result) = instance.call(&action.method, &scope, &action.request) {
        return result.map(|r| (r, scope));
    }

    if action.method == RELOAD_METHOD {
        let identity = instance
            .identity()
            .ok_or_else(|| ActionError::NotIdentifiable(action.actionable_type.clone()))?;
        return Ok((reload_response(identity, instance.into_component()), scope));
    }

    Err(ActionError::MethodNotFound(action.method))
}

// ─────────────────────────────────────────────────────────────────────────────
// Client scope
// ─────────────────────────────────────────────────────────────────────────────

/// Wrap `children` in a scope that knows how to post actions for `component`
///
/// Identifiable components also get a cookie hook for their cookie-tagged
/// query fields, and the whole scope is wrapped in their portal.
pub fn actionable<C: Actionable>(
    ctx: &Ctx,
    component: &C,
    children: Vec<Component>,
) -> Result<Component, QueryError> {
    actionable_observing(ctx, component, &[], children)
}

/// [`actionable`] with notification observers attached to the scope, so
/// their scripts can post actions through the scope's `locals`
pub fn actionable_observing<C: Actionable>(
    ctx: &Ctx,
    component: &C,
    observers: &[Observer],
    children: Vec<Component>,
) -> Result<Component, QueryError> {
    let action_base = pretty_json(&Action {
        actionable_type: C::type_key(),
        actionable: serde_json::to_value(component)?,
        injector: ctx.injector().unwrap_or_default().to_string(),
        sync_query: ctx.is_sync_query(),
        method: String::new(),
        request: json!({}),
    });
    let query_tags = extract_tags::<C>()?;

    let encoders: String = QUERY_METHODS
        .iter()
        .map(|m| format!("__queryEncoder_{}__: {},\n", m.name, m.encoder))
        .collect();

    let identity = component.identity();
    let mut inner: Vec<Component> = Vec::with_capacity(children.len() + 1);
    if identity.is_some() {
        let cookie_hook = format!(
            r#"({{el}}) => {{
	const cookieTags = locals.{LOCALS_QUERY_TAGS}().filter(tag => tag.cookie)
	locals.{LOCALS_SET_COOKIES} = function(v) {{
		if (!v.sync_query || !el.ownerDocument) {{
			return;
		}}
		el.ownerDocument.cookie = "{}=" + plaid().encodeObjectToQuery(v.actionable, cookieTags);
	}}
}}"#,
            sync_cookie_key(component)
        );
        inner.push(Arc::new(Tag::div().attr("v-on-mounted", cookie_hook)));
    }
    inner.extend(children);

    let init = format!(
        r#"{{
	{encoders}
	{LOCALS_NEW_ACTION}: function() {{
		return {action_base};
	}},
	{LOCALS_QUERY_TAGS}: function(v) {{
		let tags = {tags} || [];
		tags.forEach(tag => {{
			if (tag.method) {{
				tag.encoder = this["__queryEncoder_" + tag.method + "__"];
			}}
		}});
		return tags;
	}},
	{LOCALS_SET_COOKIES}: function(v) {{}},
	{LOCALS_ENCODE_QUERY}: function(v) {{
		if (!v.sync_query) {{
			return "";
		}}
		return plaid().encodeObjectToQuery(v.actionable, this.{LOCALS_QUERY_TAGS}());
	}},
}}"#,
        tags = pretty_json(&*query_tags),
    );

    let mut scope = Tag::new("go-plaid-scope")
        .attr("v-slot", "{ locals }")
        .attr(":init", init);
    if !observers.is_empty() {
        scope = scope.attr(":observers", serde_json::to_string(observers)?);
    }
    let scope: Component = Arc::new(scope.children(inner));

    Ok(match identity {
        Some(identity) => portalize(identity, vec![scope]),
        None => scope,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Post action
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostActionOptions {
    /// Send the given component state instead of the scope's copy
    pub use_provided_component: bool,
    /// Extra statements run against the action `v` before posting
    pub fixes: Vec<String>,
}

impl PostActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_provided_component(mut self) -> Self {
        self.use_provided_component = true;
        self
    }

    pub fn append_fix(mut self, js: impl Into<String>) -> Self {
        self.fixes.push(js.into());
        self
    }
}

/// Script posting `method` with `request` from inside `component`'s scope
///
/// # Panics
/// If `request` or the component state cannot be serialized.
pub fn post_action<C, R>(
    ctx: &Ctx,
    component: &C,
    method: &str,
    request: &R,
    mut opts: PostActionOptions,
) -> EventBuilder
where
    C: Actionable,
    R: Serialize + ?Sized,
{
    if opts.use_provided_component {
        opts.fixes
            .insert(0, format!("v.actionable = {};", pretty_json(component)));
    }
    let fix = if opts.fixes.is_empty() {
        String::new()
    } else {
        format!("\n{}", opts.fixes.join("\n"))
    };

    let run = format!(
        r#"function(b){{
	let v = locals.{LOCALS_NEW_ACTION}(); // {type_key}
	v.method = {method};
	v.request = {request};{fix}

	b.{ACTION_FIELD} = v;
	b.__stringQuery__ = locals.{LOCALS_ENCODE_QUERY}(v);
	locals.{LOCALS_SET_COOKIES}(v);
}}"#,
        type_key = C::type_key(),
        method = Value::String(method.to_string()),
        request = pretty_json(request),
    );

    EventBuilder::post()
        .event_func(DISPATCH_EVENT)
        .queries(&json!({}))
        .url(&ctx.request().path)
        .run(run)
        .string_query("(b) => b.__stringQuery__")
        .push_state("(b) => b.__action__.sync_query")
        .before_fetch(format!(
            r#"({{b, url, opts}}) => {{
		opts.body.set({}, JSON.stringify(b.{ACTION_FIELD}, null, "\t"));
		return [url, opts];
	}}"#,
            Value::String(ACTION_FIELD.to_string())
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InjectError;
    use crate::stateful::component::{MethodTable, Output, Param, Signature};
    use crate::stateful::inject::{Inject, Injectable, Resolver};
    use crate::stateful::query::{FieldShape, Reflect, Shape, StructShape};
    use crate::stateful::Runtime;
    use crate::web::{RawHtml, Render, RequestData};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RAW_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Clone, PartialEq)]
    struct Prefix(String);

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Note {
        id: String,
        text: String,
        #[serde(default)]
        pinned: bool,
        #[serde(skip)]
        prefix: Inject<Prefix>,
    }

    #[derive(Debug, Deserialize)]
    struct EditRequest {
        text: String,
    }

    impl Render for Note {
        fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
            let prefix = self
                .prefix
                .get()
                .map(|p| p.0.clone())
                .unwrap_or_default();
            actionable(
                ctx,
                self,
                vec![Arc::new(RawHtml(format!("<p>{}{}</p>", prefix, self.text)))],
            )?
            .render(ctx)
        }
    }

    impl Injectable for Note {
        fn inject(&mut self, resolver: &mut Resolver<'_>) -> Result<(), InjectError> {
            resolver.fill(&mut self.prefix)
        }
    }

    impl Reflect for Note {
        fn shape() -> Shape {
            Shape::Struct(
                StructShape::new::<Self>()
                    .field(FieldShape::of::<String>("id"))
                    .field(FieldShape::at::<Self, String>("text", |n| &mut n.text).query("text;cookie"))
                    .field(FieldShape::of::<bool>("pinned")),
            )
        }
    }

    impl Actionable for Note {
        fn type_key() -> String {
            "Note".into()
        }

        fn methods(table: &mut MethodTable<Self>) {
            table
                .method("Pin", |n: &mut Note, _ctx: &Ctx| {
                    n.pinned = true;
                    let mut r = EventResponse::new();
                    r.append_run_script(format!("pinned({})", n.id));
                    Ok(r)
                })
                .method_with::<EditRequest, _>("Edit", |n: &mut Note, ctx: &Ctx, req: EditRequest| {
                    if req.text.is_empty() {
                        anyhow::bail!("text is required");
                    }
                    n.text = req.text;
                    let mut r = EventResponse::new();
                    r.append_run_script(format!(
                        "edited({:?}, {:?}, {})",
                        n.text,
                        ctx.injector().unwrap_or_default(),
                        ctx.is_sync_query()
                    ));
                    Ok(r)
                })
                .raw(
                    "Broken",
                    Signature {
                        params: vec![Param::Context],
                        outputs: vec![Output::Response],
                    },
                    |_n: &mut Note, _ctx: &Ctx, _req: &Value| {
                        RAW_CALLS.fetch_add(1, Ordering::SeqCst);
                        Ok(EventResponse::new())
                    },
                );
        }

        fn identity(&self) -> Option<String> {
            if self.id.is_empty() {
                None
            } else {
                Some(format!("Note:{}", self.id))
            }
        }
    }

    fn ctx() -> Ctx {
        let runtime = Runtime::new();
        runtime.registry().register::<Note>();
        runtime.injectors().register_injector("notes", None);
        runtime
            .injectors()
            .provide("notes", || Prefix("> ".into()))
            .unwrap();
        Ctx::new(Arc::new(runtime), RequestData::new("/notes"))
    }

    fn action(method: &str, request: Value) -> String {
        json!({
            "actionable_type": "Note",
            "actionable": {"id": "N0", "text": "hello"},
            "injector": "notes",
            "sync_query": true,
            "method": method,
            "request": request,
        })
        .to_string()
    }

    #[test]
    fn test_dispatch_calls_context_method() {
        let (r, _) = dispatch(&ctx(), &action("Pin", json!({}))).unwrap();
        assert_eq!(r.run_script, "pinned(N0)");
    }

    #[test]
    fn test_dispatch_decodes_request_and_marks_scope() {
        let (r, scope) = dispatch(&ctx(), &action("Edit", json!({"text": "bye"}))).unwrap();
        assert_eq!(r.run_script, r#"edited("bye", "notes", true)"#);
        assert_eq!(scope.injector(), Some("notes"));
        assert!(scope.is_sync_query());
    }

    #[test]
    fn test_dispatch_request_shape_mismatch() {
        let err = dispatch(&ctx(), &action("Edit", json!({"text": 5}))).unwrap_err();
        assert!(matches!(err, ActionError::Request { ref method, .. } if method == "Edit"));
    }

    #[test]
    fn test_dispatch_wraps_method_errors() {
        let err = dispatch(&ctx(), &action("Edit", json!({"text": ""}))).unwrap_err();
        let ActionError::Method { method, source } = err else {
            panic!("expected a method error");
        };
        assert_eq!(method, "Edit");
        assert_eq!(source.to_string(), "text is required");
    }

    #[test]
    fn test_invalid_signature_is_never_invoked() {
        let err = dispatch(&ctx(), &action("Broken", Value::Null)).unwrap_err();
        assert!(matches!(err, ActionError::Signature { .. }));
        assert_eq!(RAW_CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_unknown_type_and_method() {
        let ctx = ctx();
        let bad_type = json!({"actionable_type": "Nope", "method": "Pin"}).to_string();
        assert!(matches!(
            dispatch(&ctx, &bad_type),
            Err(ActionError::TypeNotFound(_))
        ));
        assert!(matches!(
            dispatch(&ctx, &action("Fly", json!({}))),
            Err(ActionError::MethodNotFound(m)) if m == "Fly"
        ));
        assert!(matches!(dispatch(&ctx, "{"), Err(ActionError::Decode(_))));
    }

    #[test]
    fn test_dispatch_rejects_mismatched_state() {
        let raw = json!({"actionable_type": "Note", "actionable": {"pinned": "yes"}}).to_string();
        assert!(matches!(
            dispatch(&ctx(), &raw),
            Err(ActionError::State { .. })
        ));
    }

    #[test]
    fn test_dispatch_unknown_injector() {
        let raw = json!({"actionable_type": "Note", "injector": "missing", "method": "Pin"}).to_string();
        assert!(matches!(
            dispatch(&ctx(), &raw),
            Err(ActionError::Inject(InjectError::InjectorNotFound(_)))
        ));
    }

    #[test]
    fn test_reload_fallback_renders_injected_state() {
        let ctx = ctx();
        let (r, scope) = dispatch(&ctx, &action(RELOAD_METHOD, json!({}))).unwrap();
        let envelope = r.render(&scope).unwrap();
        assert_eq!(envelope.update_portals[0].name, "Note:N0");
        let body = &envelope.update_portals[0].body;
        assert!(body.starts_with("<go-plaid-scope"));
        assert!(body.contains("<p>> hello</p>"));
    }

    #[test]
    fn test_reload_requires_identity() {
        let raw = json!({"actionable_type": "Note", "actionable": {"text": "x"}, "method": "OnReload"}).to_string();
        assert!(matches!(
            dispatch(&ctx(), &raw),
            Err(ActionError::NotIdentifiable(_))
        ));
    }

    #[test]
    fn test_actionable_scope_markup() {
        let ctx = ctx().with_injector("notes");
        let note = Note {
            id: "N1".into(),
            text: "hi".into(),
            ..Default::default()
        };
        let html = actionable(&ctx, &note, vec![]).unwrap().render(&ctx).unwrap();

        assert!(html.starts_with("<go-plaid-portal :visible='true' portal-name='Note:N1'><go-plaid-scope v-slot='{ locals }'"));
        assert!(html.contains(r#""actionable_type": "Note""#));
        assert!(html.contains(r#""injector": "notes""#));
        assert!(html.contains("__queryEncoder_bare__"));
        assert!(html.contains(&format!("{}=", sync_cookie_key(&note))));
    }

    #[test]
    fn test_anonymous_component_has_no_portal_or_cookie_hook() {
        let ctx = ctx();
        let html = actionable(&ctx, &Note::default(), vec![])
            .unwrap()
            .render(&ctx)
            .unwrap();
        assert!(html.starts_with("<go-plaid-scope"));
        assert!(!html.contains("v-on-mounted"));
    }

    #[test]
    fn test_observers_attach_to_scope() {
        let ctx = ctx();
        let observers = [Observer::new("Changed", "reload()")];
        let html = actionable_observing(&ctx, &Note::default(), &observers, vec![])
            .unwrap()
            .render(&ctx)
            .unwrap();
        assert!(html.contains(r#":observers='[{"name":"Changed","script":"reload()"}]'"#));

        let plain = actionable(&ctx, &Note::default(), vec![]).unwrap().render(&ctx).unwrap();
        assert!(!plain.contains(":observers"));
    }

    #[test]
    fn test_post_action_script() {
        let ctx = ctx();
        let note = Note::default();
        let script = post_action(
            &ctx,
            &note,
            "Edit",
            &json!({"text": "x"}),
            PostActionOptions::new().append_fix("v.sync_query = false;"),
        )
        .go();

        assert!(script.starts_with("plaid().vars(vars).locals(locals).form(form).method(\"POST\").eventFunc(\"__dispatch_actionable_action__\").queries({}).url(\"/notes\")"));
        assert!(script.contains("let v = locals.newAction(); // Note"));
        assert!(script.contains(r#"v.method = "Edit";"#));
        assert!(script.contains("v.sync_query = false;"));
        assert!(script.contains(r#"opts.body.set("__action__""#));
        assert!(script.ends_with(".go()"));
    }
}
