//! TodoMVC built from actionable components
//!
//! Two `TodoApp`s share one store. The first lives under the `top` injector and
//! keeps its filter in the URL and a cookie; the second lives under `top/sub`,
//! whose `TodoAppDep` colours item titles. Every mutation emits
//! `NotifyTodosChanged` and each app reloads itself when it observes it.

use super::storage::{Db, MemoryStorage, Todo};
use crate::stateful::query::{FieldShape, Reflect, Shape, StructShape};
use crate::stateful::{
    actionable, actionable_observing, post_action, reload_action, Actionable, Inject, Injectable,
    MethodTable, PostActionOptions, Resolver, Runtime, SyncQuery,
};
use crate::error::InjectError;
use crate::web::{component, Component, Ctx, EventResponse, Observer, PageResponse, RawHtml, Render, Tag, Text};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const NOTIFY_TODOS_CHANGED: &str = "NotifyTodosChanged";

pub const INJECTOR_TOP: &str = "top";
pub const INJECTOR_SUB: &str = "top/sub";

pub const VISIBILITY_ALL: &str = "all";
pub const VISIBILITY_ACTIVE: &str = "active";
pub const VISIBILITY_COMPLETED: &str = "completed";

const STYLESHEET: &str = r#"<link rel="stylesheet" type="text/css" href="https://unpkg.com/todomvc-app-css@2.4.1/index.css"><style>body{max-width: 100%;}</style>"#;

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies
// ─────────────────────────────────────────────────────────────────────────────

pub type ItemTitle = Arc<dyn Fn(&Todo) -> Tag + Send + Sync>;

/// What a todo app needs from its injector
#[derive(Clone)]
pub struct TodoAppDep {
    pub db: Db,
    /// Replaces the plain title label when set
    pub item_title: Option<ItemTitle>,
}

impl fmt::Debug for TodoAppDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoAppDep")
            .field("item_title", &self.item_title.is_some())
            .finish_non_exhaustive()
    }
}

fn coloured_title(todo: &Todo) -> Tag {
    let colour = if todo.completed { "red" } else { "green" };
    Tag::label()
        .style(&format!("color: {colour};"))
        .text(todo.title.clone())
}

// ─────────────────────────────────────────────────────────────────────────────
// TodoApp
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoApp {
    #[serde(skip)]
    dep: Inject<TodoAppDep>,

    pub id: String,
    pub visibility: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
}

impl TodoApp {
    pub fn new(id: &str, visibility: &str) -> Self {
        Self {
            id: id.to_string(),
            visibility: visibility.to_string(),
            ..Default::default()
        }
    }

    fn filtered<'a>(&self, todos: &'a [Todo]) -> Vec<&'a Todo> {
        todos
            .iter()
            .filter(|t| match self.visibility.as_str() {
                VISIBILITY_ACTIVE => !t.completed,
                VISIBILITY_COMPLETED => t.completed,
                _ => true,
            })
            .collect()
    }

    fn create_todo(&mut self, req: CreateTodoRequest) -> Result<EventResponse> {
        let mut r = EventResponse::new();
        let title = req.title.trim();
        if title.is_empty() {
            r.append_run_script("alert('title can not be empty')");
            return Ok(r);
        }

        let todo = self.dep.get()?.db.create(title)?;
        tracing::debug!(app = %self.id, todo = %todo.id, "todo created");
        r.emit(NOTIFY_TODOS_CHANGED, &Value::Null);
        Ok(r)
    }

    fn toggle_all(&mut self) -> Result<EventResponse> {
        let db = &self.dep.get()?.db;
        let todos = db.list()?;
        let all_completed = todos.iter().all(|t| t.completed);
        for mut todo in todos {
            todo.completed = !all_completed;
            db.update(&todo)?;
        }

        let mut r = EventResponse::new();
        r.emit(NOTIFY_TODOS_CHANGED, &Value::Null);
        Ok(r)
    }

    fn filter_link(&self, ctx: &Ctx, label: &str, visibility: &'static str, opts: PostActionOptions) -> Tag {
        let select: &dyn Fn(&mut TodoApp) = &move |target: &mut TodoApp| {
            target.visibility = visibility.to_string();
        };
        Tag::li().child(
            Tag::a()
                .class_if("selected", self.visibility == visibility)
                .attr("@click", reload_action(ctx, self, Some(select), opts).go())
                .text(label),
        )
    }
}

fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        singular.to_string()
    } else {
        plural.to_string()
    }
}

impl Render for TodoApp {
    fn render(&self, ctx: &Ctx) -> Result<String> {
        let todos = self.dep.get()?.db.list()?;
        let remaining = todos.iter().filter(|t| !t.completed).count();
        let injector = ctx
            .injector()
            .ok_or_else(|| anyhow!("TodoApp {} rendered outside an injector", self.id))?;

        let items = self
            .filtered(&todos)
            .into_iter()
            .map(|todo| {
                let mut item = TodoItem {
                    id: todo.id.clone(),
                    todo: Some(todo.clone()),
                    ..Default::default()
                };
                ctx.runtime().injectors().apply(injector, &mut item)?;
                Ok(component(item))
            })
            .collect::<Result<Vec<Component>, InjectError>>()?;

        let has_todos = (!todos.is_empty()).to_string();
        let toggle_all_id = format!("{}-toggle-all", self.id);

        let header = Tag::header().class("header").child(Tag::h1().text("Todos")).child(
            Tag::input()
                .attr("v-on-mounted", "({el}) => el.focus()")
                .class("new-todo")
                .id(&format!("{}-creator", self.id))
                .attr("placeholder", "What needs to be done?")
                .attr(
                    "@keyup.enter",
                    post_action(
                        ctx,
                        self,
                        "CreateTodo",
                        &CreateTodoRequest::default(),
                        PostActionOptions::new().append_fix("v.request.title = $event.target.value;"),
                    )
                    .go(),
                ),
        );

        let main = Tag::section()
            .class("main")
            .attr("v-show", has_todos.clone())
            .child(
                Tag::input()
                    .attr("type", "checkbox")
                    .id(&toggle_all_id)
                    .class("toggle-all")
                    .flag("checked", remaining == 0)
                    .attr(
                        "@change",
                        post_action(ctx, self, "ToggleAll", &Value::Null, PostActionOptions::new()).go(),
                    ),
            )
            .child(
                Tag::label()
                    .attr("for", toggle_all_id)
                    .text("Mark all as complete"),
            )
            .child(Tag::ul().class("todo-list").children(items));

        let footer = Tag::footer()
            .class("footer")
            .attr("v-show", has_todos)
            .child(
                Tag::span()
                    .class("todo-count")
                    .child(Tag::strong().text(remaining.to_string()))
                    .child(Text(format!(" {} left", pluralize(remaining, "item", "items")))),
            )
            .child(
                Tag::ul()
                    .class("filters")
                    .child(self.filter_link(
                        ctx,
                        "All",
                        VISIBILITY_ALL,
                        PostActionOptions::new().use_provided_component(),
                    ))
                    .child(self.filter_link(ctx, "Active", VISIBILITY_ACTIVE, PostActionOptions::new()))
                    .child(self.filter_link(ctx, "Completed", VISIBILITY_COMPLETED, PostActionOptions::new())),
            );

        let observers = [Observer::new(
            NOTIFY_TODOS_CHANGED,
            reload_action(ctx, self, None, PostActionOptions::new()).go(),
        )];
        let app = Tag::section()
            .class("todoapp")
            .child(header)
            .child(main)
            .child(footer);

        actionable_observing(ctx, self, &observers, vec![component(app)])?.render(ctx)
    }
}

impl Injectable for TodoApp {
    fn inject(&mut self, resolver: &mut Resolver<'_>) -> Result<(), InjectError> {
        resolver.fill(&mut self.dep)
    }
}

impl Reflect for TodoApp {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::of::<String>("id"))
                .field(
                    FieldShape::at::<Self, String>("visibility", |app| &mut app.visibility)
                        .query("visibility;cookie"),
                ),
        )
    }
}

impl Actionable for TodoApp {
    fn methods(table: &mut MethodTable<Self>) {
        table
            .method_with::<CreateTodoRequest, _>(
                "CreateTodo",
                |app: &mut TodoApp, _ctx: &Ctx, req: CreateTodoRequest| app.create_todo(req),
            )
            .method("ToggleAll", |app: &mut TodoApp, _ctx: &Ctx| app.toggle_all());
    }

    fn identity(&self) -> Option<String> {
        Some(format!("TodoApp:{}", self.id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TodoItem
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoItem {
    // the store directly, next to the app dependency
    #[serde(skip)]
    db: Inject<Db>,
    #[serde(skip)]
    dep: Inject<TodoAppDep>,

    pub id: String,
    /// Used as-is when set, otherwise loaded by `id`
    #[serde(skip)]
    todo: Option<Todo>,
}

impl TodoItem {
    fn toggle(&mut self) -> Result<EventResponse> {
        let db = self.db.get()?;
        let mut todo = db.read(&self.id)?;
        todo.completed = !todo.completed;
        db.update(&todo)?;

        let mut r = EventResponse::new();
        r.emit(NOTIFY_TODOS_CHANGED, &Value::Null);
        Ok(r)
    }

    fn remove(&mut self) -> Result<EventResponse> {
        self.db.get()?.delete(&self.id)?;

        let mut r = EventResponse::new();
        r.emit(NOTIFY_TODOS_CHANGED, &Value::Null);
        Ok(r)
    }
}

impl Render for TodoItem {
    fn render(&self, ctx: &Ctx) -> Result<String> {
        let todo = match &self.todo {
            Some(todo) => todo.clone(),
            None => self.db.get()?.read(&self.id)?,
        };
        let title = match &self.dep.get()?.item_title {
            Some(item_title) => item_title(&todo),
            None => Tag::label().text(todo.title.clone()),
        };

        let item = Tag::li().class_if("completed", todo.completed).child(
            Tag::div()
                .class("view")
                .child(
                    Tag::input()
                        .attr("type", "checkbox")
                        .class("toggle")
                        .flag("checked", todo.completed)
                        .attr(
                            "@change",
                            post_action(
                                ctx,
                                self,
                                "Toggle",
                                &Value::Null,
                                PostActionOptions::new().use_provided_component(),
                            )
                            .go(),
                        ),
                )
                .child(title)
                .child(Tag::button().class("destroy").attr(
                    "@click",
                    post_action(ctx, self, "Remove", &Value::Null, PostActionOptions::new()).go(),
                )),
        );

        actionable(ctx, self, vec![component(item)])?.render(ctx)
    }
}

impl Injectable for TodoItem {
    fn inject(&mut self, resolver: &mut Resolver<'_>) -> Result<(), InjectError> {
        resolver.fill(&mut self.db)?;
        resolver.fill(&mut self.dep)
    }
}

impl Reflect for TodoItem {
    fn shape() -> Shape {
        Shape::Struct(StructShape::new::<Self>().field(FieldShape::of::<String>("id")))
    }
}

impl Actionable for TodoItem {
    fn methods(table: &mut MethodTable<Self>) {
        table
            .method("Toggle", |item: &mut TodoItem, _ctx: &Ctx| item.toggle())
            .method("Remove", |item: &mut TodoItem, _ctx: &Ctx| item.remove());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Installation
// ─────────────────────────────────────────────────────────────────────────────

/// Register the component types, injectors and providers on `runtime`
pub fn install(runtime: &Runtime) -> Result<()> {
    runtime.registry().try_register::<TodoApp>()?;
    runtime.registry().try_register::<TodoItem>()?;

    let injectors = runtime.injectors();
    injectors.try_register_injector(INJECTOR_TOP, None)?;
    injectors.try_register_injector(INJECTOR_SUB, Some(INJECTOR_TOP))?;

    injectors.provide(INJECTOR_TOP, || Arc::new(MemoryStorage::new()) as Db)?;
    injectors.provide(INJECTOR_TOP, |db: Db| TodoAppDep {
        db,
        item_title: None,
    })?;
    injectors.provide(INJECTOR_SUB, |db: Db| TodoAppDep {
        db,
        item_title: Some(Arc::new(coloured_title) as ItemTitle),
    })?;
    Ok(())
}

/// The demo page: one synced app under `top`, one plain app under `top/sub`
pub fn todomvc_page(ctx: &Ctx) -> Result<PageResponse> {
    let injectors = ctx.runtime().injectors();
    let synced = injectors.inject(
        INJECTOR_TOP,
        SyncQuery::new(TodoApp::new("TodoApp0", VISIBILITY_ALL)),
    )?;
    let coloured = injectors.inject(INJECTOR_SUB, TodoApp::new("TodoApp1", VISIBILITY_COMPLETED))?;

    let body = Tag::div()
        .style("display: flex; justify-content: center;")
        .child(RawHtml(STYLESHEET.to_string()))
        .child(
            Tag::div()
                .style("width: 550px; margin-right: 40px;")
                .child(synced),
        )
        .child(Tag::div().style("width: 550px;").child(coloured));

    Ok(PageResponse {
        page_title: "TodoMVC".into(),
        body: component(body),
    })
}
