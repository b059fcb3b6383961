//! Query tags: persisting component fields into the page URL
//!
//! A component opts fields into URL synchronization by describing itself
//! through [`Reflect`]. Each struct field carries its JSON name rule and an
//! optional query tag written as `"name,omitempty;cookie;method:bare,prefix"`:
//!
//! - `name` is the query key (defaults to the field's JSON name)
//! - `omitempty` drops falsy values when encoding
//! - `cookie` also persists the field into the component's sync cookie
//! - `method:<codec>,<args..>` delegates encoding to a named [`QueryMethod`]
//!
//! Tagged fields are declared with [`FieldShape::at`], which also records how
//! to write a decoded value back into the field. Decoding touches nothing
//! else on the target.
//!
//! Tags are collected once per concrete type and cached, errors included.

mod codec;
mod methods;
#[cfg(test)]
mod tests;

use crate::error::QueryError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, LazyLock, OnceLock};

pub use codec::{escape, is_query_subset, is_raw_query_subset, unescape, QueryMap, QueryValues};
pub use methods::{query_method, QueryMethod, BARE, QUERY_METHODS};

// ─────────────────────────────────────────────────────────────────────────────
// Shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Declarative description of a value's JSON shape
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    String,
    Int,
    Uint,
    Float,
    Bool,
    Optional(Box<Shape>),
    Seq(Box<Shape>),
    Struct(StructShape),
}

impl Shape {
    /// Strip any `Optional` layers
    pub fn unwrap_optional(&self) -> &Shape {
        match self {
            Shape::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Int => "int",
            Shape::Uint => "uint",
            Shape::Float => "float",
            Shape::Bool => "bool",
            Shape::Optional(_) => "optional",
            Shape::Seq(_) => "seq",
            Shape::Struct(_) => "struct",
        }
    }

    /// JSON value a field of this shape holds when cleared
    pub fn zero_value(&self) -> Value {
        match self {
            Shape::String => Value::String(String::new()),
            Shape::Int | Shape::Uint => Value::from(0),
            Shape::Float => Value::from(0.0),
            Shape::Bool => Value::Bool(false),
            Shape::Optional(_) => Value::Null,
            Shape::Seq(_) => Value::Array(Vec::new()),
            Shape::Struct(s) => s.zero_value(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field accessors
// ─────────────────────────────────────────────────────────────────────────────

type AssignFn = dyn Fn(&mut dyn Any, Value) -> Result<(), QueryError> + Send + Sync;

/// Writes a decoded JSON value into one field of a live value
///
/// Decoding only ever touches fields reached through an `Assign`, so state
/// that is not part of the query (skipped or injected fields) survives.
#[derive(Clone)]
pub struct Assign(Arc<AssignFn>);

impl Assign {
    fn field<S, F>(ident: &'static str, access: fn(&mut S) -> &mut F) -> Self
    where
        S: 'static,
        F: DeserializeOwned + 'static,
    {
        Self(Arc::new(move |target: &mut dyn Any, value: Value| -> Result<(), QueryError> {
            let target = target
                .downcast_mut::<S>()
                .ok_or_else(|| mismatch::<S>(ident))?;
            *access(target) = serde_json::from_value(value)?;
            Ok(())
        }))
    }

    /// Reach the field through `project` on an enclosing `S`
    fn through<S, E>(self, ident: &'static str, project: fn(&mut S) -> &mut E) -> Self
    where
        S: 'static,
        E: 'static,
    {
        Self(Arc::new(move |target: &mut dyn Any, value: Value| -> Result<(), QueryError> {
            let outer = target
                .downcast_mut::<S>()
                .ok_or_else(|| mismatch::<S>(ident))?;
            self.apply(project(outer), value)
        }))
    }

    pub fn apply(&self, target: &mut dyn Any, value: Value) -> Result<(), QueryError> {
        (self.0)(target, value)
    }
}

fn mismatch<S>(field: &str) -> QueryError {
    QueryError::TargetMismatch {
        field: field.to_string(),
        expected: std::any::type_name::<S>(),
    }
}

impl fmt::Debug for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Assign(..)")
    }
}

// accessors are not part of a shape's identity
impl PartialEq for Assign {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// How a field appears in the serialized JSON object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonName {
    /// Serialized under its Rust identifier
    Default,
    Rename(String),
    /// `#[serde(skip)]`
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub ident: &'static str,
    pub json: JsonName,
    pub query: Option<String>,
    /// `#[serde(flatten)]`
    pub embedded: bool,
    /// Not part of the serialized state at all
    pub private: bool,
    pub shape: Shape,
    /// Write access used when decoding a query into the field
    pub assign: Option<Assign>,
}

impl FieldShape {
    pub fn of<T: Reflect>(ident: &'static str) -> Self {
        Self {
            ident,
            json: JsonName::Default,
            query: None,
            embedded: false,
            private: false,
            shape: T::shape(),
            assign: None,
        }
    }

    /// A field of `S` that query decoding can write through `access`
    ///
    /// ```ignore
    /// FieldShape::at::<Self, String>("visibility", |s| &mut s.visibility).query("visibility")
    /// ```
    pub fn at<S, T>(ident: &'static str, access: fn(&mut S) -> &mut T) -> Self
    where
        S: 'static,
        T: Reflect + DeserializeOwned + 'static,
    {
        Self {
            assign: Some(Assign::field(ident, access)),
            ..Self::of::<T>(ident)
        }
    }

    /// A flattened field whose own fields are lifted into the parent
    pub fn embed<T: Reflect>(ident: &'static str) -> Self {
        Self {
            embedded: true,
            ..Self::of::<T>(ident)
        }
    }

    /// [`FieldShape::embed`] whose lifted fields stay decodable from `S`
    pub fn embed_at<S, T>(ident: &'static str, project: fn(&mut S) -> &mut T) -> Self
    where
        S: 'static,
        T: Reflect + 'static,
    {
        let mut field = Self::embed::<T>(ident);
        if let Shape::Struct(inner) = &mut field.shape {
            inner.route_through(ident, project);
        }
        field
    }

    /// JSON name override; `"-"` marks the field as skipped
    pub fn json(mut self, name: &str) -> Self {
        self.json = match name {
            "" => JsonName::Default,
            "-" => JsonName::Skip,
            other => JsonName::Rename(other.to_string()),
        };
        self
    }

    pub fn query(mut self, tag: &str) -> Self {
        self.query = Some(tag.to_string());
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    fn json_name(&self) -> Option<String> {
        match &self.json {
            JsonName::Default => Some(self.ident.to_string()),
            JsonName::Rename(name) => Some(name.clone()),
            JsonName::Skip => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructShape {
    pub type_name: &'static str,
    pub fields: Vec<FieldShape>,
}

impl StructShape {
    pub fn new<T: ?Sized>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }

    /// Re-root every accessor lifted into this struct onto an enclosing `S`
    fn route_through<S: 'static, E: 'static>(&mut self, ident: &'static str, project: fn(&mut S) -> &mut E) {
        for field in &mut self.fields {
            if let Some(assign) = field.assign.take() {
                field.assign = Some(assign.through(ident, project));
            }
            if field.embedded && !matches!(field.json, JsonName::Rename(_)) {
                if let Shape::Struct(inner) = &mut field.shape {
                    inner.route_through(ident, project);
                }
            }
        }
    }

    /// Serialized keys and their shapes, embedded structs lifted, sorted by key
    pub fn json_keys(&self) -> Result<BTreeMap<String, Shape>, QueryError> {
        let mut keys = BTreeMap::new();
        self.collect_json_keys(&mut keys)?;
        Ok(keys)
    }

    fn collect_json_keys(&self, keys: &mut BTreeMap<String, Shape>) -> Result<(), QueryError> {
        for field in &self.fields {
            if field.embedded && !matches!(field.json, JsonName::Rename(_)) {
                if let Shape::Struct(inner) = field.shape.unwrap_optional() {
                    inner.collect_json_keys(keys)?;
                }
                continue;
            }
            if field.private {
                return Err(QueryError::PrivateField {
                    type_name: self.type_name.to_string(),
                    field: field.ident.to_string(),
                });
            }
            let Some(name) = field.json_name() else {
                return Err(QueryError::JsonIgnored {
                    type_name: self.type_name.to_string(),
                    field: field.ident.to_string(),
                });
            };
            keys.insert(name, field.shape.clone());
        }
        Ok(())
    }

    pub fn zero_value(&self) -> Value {
        let mut obj = Map::new();
        self.fill_zero(&mut obj);
        Value::Object(obj)
    }

    fn fill_zero(&self, obj: &mut Map<String, Value>) {
        for field in &self.fields {
            if field.private {
                continue;
            }
            if field.embedded && !matches!(field.json, JsonName::Rename(_)) {
                if let Shape::Struct(inner) = field.shape.unwrap_optional() {
                    inner.fill_zero(obj);
                }
                continue;
            }
            if let Some(name) = field.json_name() {
                obj.insert(name, field.shape.zero_value());
            }
        }
    }
}

/// Types that can describe their own JSON shape
pub trait Reflect {
    fn shape() -> Shape;
}

macro_rules! reflect_scalar {
    ($shape:ident: $($t:ty),*) => {
        $(impl Reflect for $t {
            fn shape() -> Shape {
                Shape::$shape
            }
        })*
    };
}

reflect_scalar!(String: String);
reflect_scalar!(Bool: bool);
reflect_scalar!(Int: i8, i16, i32, i64, isize);
reflect_scalar!(Uint: u8, u16, u32, u64, usize);
reflect_scalar!(Float: f32, f64);

impl<T: Reflect> Reflect for Option<T> {
    fn shape() -> Shape {
        Shape::Optional(Box::new(T::shape()))
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn shape() -> Shape {
        Shape::Seq(Box::new(T::shape()))
    }
}

impl<T: Reflect> Reflect for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryTag {
    pub name: String,
    pub json_name: String,
    pub omitempty: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cookie: bool,

    /// Rust field identifier the tag came from
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub shape: Shape,
    #[serde(skip)]
    pub assign: Option<Assign>,
}

/// Ordered tag list of one component type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryTags(Vec<QueryTag>);

impl Deref for QueryTags {
    type Target = [QueryTag];

    fn deref(&self) -> &[QueryTag] {
        &self.0
    }
}

impl FromIterator<QueryTag> for QueryTags {
    fn from_iter<I: IntoIterator<Item = QueryTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl QueryTags {
    /// Collect tags from the shape of `type_name`, which must describe a struct
    pub fn from_shape(type_name: &str, shape: &Shape) -> Result<Self, QueryError> {
        let Shape::Struct(s) = shape.unwrap_optional() else {
            return Err(QueryError::NotStruct {
                type_name: type_name.to_string(),
                got: shape.unwrap_optional().kind_name(),
            });
        };
        let mut tags = Vec::new();
        collect_query_tags(s, &mut tags)?;
        Ok(Self(tags))
    }

    /// Only the tags that also persist into the sync cookie
    pub fn cookie_tags(&self) -> QueryTags {
        self.iter().filter(|tag| tag.cookie).cloned().collect()
    }
}

fn collect_query_tags(shape: &StructShape, tags: &mut Vec<QueryTag>) -> Result<(), QueryError> {
    let type_name = || shape.type_name.to_string();

    for field in &shape.fields {
        let embedded = field.embedded && !matches!(field.json, JsonName::Rename(_));
        if embedded {
            if field.query.is_some() {
                return Err(QueryError::EmbeddedQueryTag {
                    type_name: type_name(),
                    field: field.ident.to_string(),
                });
            }
            if let Shape::Struct(inner) = field.shape.unwrap_optional() {
                collect_query_tags(inner, tags)?;
            }
            continue;
        }

        let Some(query) = field.query.as_deref() else {
            continue;
        };
        if query == "-" {
            continue;
        }

        if field.private {
            return Err(QueryError::PrivateField {
                type_name: type_name(),
                field: field.ident.to_string(),
            });
        }

        let mut tag = QueryTag {
            name: String::new(),
            json_name: String::new(),
            omitempty: false,
            method: String::new(),
            args: Vec::new(),
            cookie: false,
            path: field.ident.to_string(),
            shape: field.shape.clone(),
            assign: field.assign.clone(),
        };

        for (i, part) in query.split(';').enumerate() {
            if i == 0 {
                let mut vs = part.split(',');
                tag.name = vs.next().unwrap_or_default().to_string();
                tag.omitempty = vs.next() == Some("omitempty");
                continue;
            }
            let colons: Vec<&str> = part.split(':').collect();
            match colons[0] {
                "method" => {
                    if colons.len() != 2 {
                        return Err(QueryError::InvalidMethod {
                            type_name: type_name(),
                            field: field.ident.to_string(),
                        });
                    }
                    let mut vs = colons[1].split(',');
                    let name = vs.next().unwrap_or_default().trim();
                    if name.is_empty() {
                        return Err(QueryError::EmptyMethod {
                            type_name: type_name(),
                            field: field.ident.to_string(),
                        });
                    }
                    if query_method(name).is_none() {
                        return Err(QueryError::UnknownMethod(name.to_string()));
                    }
                    tag.method = name.to_string();
                    tag.args = vs.map(str::to_string).collect();
                }
                "cookie" => tag.cookie = true,
                _ => {}
            }
        }

        let Some(json_name) = field.json_name() else {
            return Err(QueryError::JsonIgnored {
                type_name: type_name(),
                field: field.ident.to_string(),
            });
        };
        tag.json_name = json_name;
        if tag.name.is_empty() {
            tag.name = tag.json_name.clone();
        }

        match tags.iter_mut().find(|t| t.json_name == tag.json_name) {
            Some(existing) => *existing = tag,
            None => tags.push(tag),
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

type TagSlot = Arc<OnceLock<Result<Arc<QueryTags>, QueryError>>>;

/// Compute-once cache of tags per concrete type
#[derive(Default)]
pub struct TagCache {
    slots: RwLock<HashMap<TypeId, TagSlot>>,
}

static GLOBAL_TAG_CACHE: LazyLock<TagCache> = LazyLock::new(TagCache::default);

impl TagCache {
    pub fn global() -> &'static TagCache {
        &GLOBAL_TAG_CACHE
    }

    /// Tags of `T`, computed at most once even under concurrent first use
    pub fn get<T: Reflect + 'static>(&self) -> Result<Arc<QueryTags>, QueryError> {
        let id = TypeId::of::<T>();
        let slot = {
            let existing = self.slots.read().get(&id).cloned();
            match existing {
                Some(slot) => slot,
                None => self.slots.write().entry(id).or_default().clone(),
            }
        };
        slot.get_or_init(|| {
            QueryTags::from_shape(std::any::type_name::<T>(), &T::shape()).map(Arc::new)
        })
            .clone()
    }
}

/// Cached tags of `T`
pub fn extract_tags<T: Reflect + 'static>() -> Result<Arc<QueryTags>, QueryError> {
    TagCache::global().get::<T>()
}

/// Encode every tagged field of `value` into query pairs
pub fn encode<T: Reflect + Serialize + 'static>(value: &T) -> Result<QueryValues, QueryError> {
    extract_tags::<T>()?.encode(value)
}
