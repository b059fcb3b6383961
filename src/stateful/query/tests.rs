//! Tests for query tag extraction and the URL codec

use super::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Embedded {
    description: String,
}

impl Reflect for Embedded {
    fn shape() -> Shape {
        Shape::Struct(StructShape::new::<Self>().field(FieldShape::of::<String>("description")))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Address {
    #[serde(flatten)]
    embedded: Embedded,
    country: String,
    city: String,
    distance: i64,
}

impl Reflect for Address {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::embed::<Embedded>("embedded"))
                .field(FieldShape::of::<String>("country"))
                .field(FieldShape::of::<String>("city"))
                .field(FieldShape::of::<i64>("distance")),
        )
    }
}

fn address(city: &str, country: &str, description: &str, distance: i64) -> Address {
    Address {
        embedded: Embedded {
            description: description.to_string(),
        },
        country: country.to_string(),
        city: city.to_string(),
        distance,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    keyword: String,
    name: String,
    age: u32,
    emails: Vec<String>,
    addresses: Vec<Address>,
    boxed_addresses: Vec<Box<Address>>,
    company_address: Option<Address>,
    active: bool,
    foo: String,
    bar: String,
}

impl Reflect for User {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::at::<Self, i64>("id", |u| &mut u.id).query("id"))
                .field(FieldShape::at::<Self, String>("keyword", |u| &mut u.keyword).query("keyword"))
                .field(FieldShape::at::<Self, String>("name", |u| &mut u.name).query("name"))
                .field(FieldShape::at::<Self, u32>("age", |u| &mut u.age).query(""))
                .field(FieldShape::at::<Self, Vec<String>>("emails", |u| &mut u.emails).query("emails"))
                .field(
                    FieldShape::at::<Self, Vec<Address>>("addresses", |u| &mut u.addresses)
                        .query("addresses"),
                )
                .field(
                    FieldShape::at::<Self, Vec<Box<Address>>>("boxed_addresses", |u| &mut u.boxed_addresses)
                        .query("ptr_addresses"),
                )
                .field(
                    FieldShape::at::<Self, Option<Address>>("company_address", |u| &mut u.company_address)
                        .query("company_address"),
                )
                .field(FieldShape::at::<Self, bool>("active", |u| &mut u.active).query("active,omitempty"))
                .field(FieldShape::at::<Self, String>("foo", |u| &mut u.foo).query("foo"))
                .field(FieldShape::at::<Self, String>("bar", |u| &mut u.bar).query("bar")),
        )
    }
}

fn tag_names(tags: &QueryTags) -> Vec<(&str, &str, &str)> {
    tags.iter()
        .map(|t| (t.name.as_str(), t.json_name.as_str(), t.path.as_str()))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

struct Plain;

impl Reflect for Plain {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::of::<i64>("id").query(""))
                .field(FieldShape::of::<String>("name").query(""))
                .field(FieldShape::of::<i64>("age").query(""))
                .field(FieldShape::of::<String>("NoJsonTag").query(""))
                .field(FieldShape::of::<String>("no_query_tag"))
                .field(FieldShape::of::<String>("ignore").json("-")),
        )
    }
}

#[test]
fn test_extract_plain_struct() {
    let tags = QueryTags::from_shape("Plain", &Plain::shape()).unwrap();
    assert_eq!(
        tag_names(&tags),
        vec![
            ("id", "id", "id"),
            ("name", "name", "name"),
            ("age", "age", "age"),
            ("NoJsonTag", "NoJsonTag", "NoJsonTag"),
        ]
    );
}

#[test]
fn test_extract_optional_struct_shape() {
    let shape = Shape::Optional(Box::new(Plain::shape()));
    let tags = QueryTags::from_shape("Option<Plain>", &shape).unwrap();
    assert_eq!(tags.len(), 4);
}

#[test]
fn test_extract_rejects_non_struct() {
    let err = QueryTags::from_shape("i64", &Shape::Int).unwrap_err();
    assert!(matches!(err, QueryError::NotStruct { got: "int", .. }));
    assert!(err.to_string().contains("expected a struct shape"));
}

#[test]
fn test_extract_rejects_private_field() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<i64>("a").private().query("")),
    );
    let err = QueryTags::from_shape("Private", &shape).unwrap_err();
    assert!(matches!(err, QueryError::PrivateField { ref field, .. } if field == "a"));
}

#[test]
fn test_extract_rejects_json_ignored_field() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<i64>("A").json("-").query("")),
    );
    let err = QueryTags::from_shape("Ignored", &shape).unwrap_err();
    assert!(err.to_string().contains("ignored by json"));
}

#[test]
fn test_extract_json_name_variants() {
    let spaced = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<i64>("A").json(" ").query("")),
    );
    let tags = QueryTags::from_shape("Spaced", &spaced).unwrap();
    assert_eq!(tag_names(&tags), vec![(" ", " ", "A")]);

    let empty = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<i64>("A").json("").query("")),
    );
    let tags = QueryTags::from_shape("Empty", &empty).unwrap();
    assert_eq!(tag_names(&tags), vec![("A", "A", "A")]);
}

#[test]
fn test_extract_embedded_override_in_place() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>()
            .field(FieldShape::embed::<Plain>("user"))
            .field(
                FieldShape::embed::<Embedded>("embedded")
                    .json("embedded")
                    .query(""),
            )
            .field(FieldShape::of::<String>("name").query("xname"))
            .field(FieldShape::of::<String>("blank").json(" blank ")),
    );
    let tags = QueryTags::from_shape("UserWithEmbed", &shape).unwrap();
    assert_eq!(
        tag_names(&tags),
        vec![
            ("id", "id", "id"),
            ("xname", "name", "name"),
            ("age", "age", "age"),
            ("NoJsonTag", "NoJsonTag", "NoJsonTag"),
            ("embedded", "embedded", "embedded"),
        ]
    );
}

#[test]
fn test_extract_rejects_query_tag_on_embedded_field() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>()
            .field(FieldShape::embed::<Embedded>("embedded").query(""))
            .field(FieldShape::of::<String>("name").query("")),
    );
    let err = QueryTags::from_shape("Bad", &shape).unwrap_err();
    assert!(matches!(err, QueryError::EmbeddedQueryTag { ref field, .. } if field == "embedded"));
}

#[test]
fn test_extract_surfaces_errors_from_embedded_struct() {
    let ignored = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<i64>("A").json("-").query("")),
    );
    let shape = Shape::Struct(
        StructShape::new::<Plain>()
            .field(FieldShape {
                embedded: true,
                shape: ignored,
                ..FieldShape::of::<i64>("ignored")
            })
            .field(FieldShape::of::<String>("name").query("")),
    );
    let err = QueryTags::from_shape("Outer", &shape).unwrap_err();
    assert!(matches!(err, QueryError::JsonIgnored { ref field, .. } if field == "A"));
}

#[test]
fn test_extract_parses_options() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>()
            .field(FieldShape::of::<String>("visibility").query(";cookie"))
            .field(FieldShape::of::<String>("filter").query("f,omitempty;method:bare,f_")),
    );
    let tags = QueryTags::from_shape("Options", &shape).unwrap();

    assert_eq!(tags[0].name, "visibility");
    assert!(tags[0].cookie);
    assert!(!tags[0].omitempty);

    assert_eq!(tags[1].name, "f");
    assert!(tags[1].omitempty);
    assert_eq!(tags[1].method, "bare");
    assert_eq!(tags[1].args, vec!["f_".to_string()]);

    let cookie = tags.cookie_tags();
    assert_eq!(cookie.len(), 1);
    assert_eq!(cookie[0].json_name, "visibility");
}

#[test]
fn test_extract_rejects_bad_methods() {
    let unknown = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<String>("f").query(";method:nope")),
    );
    assert_eq!(
        QueryTags::from_shape("Unknown", &unknown).unwrap_err(),
        QueryError::UnknownMethod("nope".into())
    );

    let empty = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<String>("f").query(";method: ")),
    );
    assert!(matches!(
        QueryTags::from_shape("Empty", &empty).unwrap_err(),
        QueryError::EmptyMethod { .. }
    ));

    let malformed = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<String>("f").query(";method:a:b")),
    );
    assert!(matches!(
        QueryTags::from_shape("Malformed", &malformed).unwrap_err(),
        QueryError::InvalidMethod { .. }
    ));
}

#[test]
fn test_tags_serialize_for_client() {
    let shape = Shape::Struct(
        StructShape::new::<Plain>().field(FieldShape::of::<String>("visibility").query(";cookie")),
    );
    let tags = QueryTags::from_shape("Client", &shape).unwrap();
    assert_eq!(
        serde_json::to_value(&tags).unwrap(),
        serde_json::json!([
            {"name": "visibility", "json_name": "visibility", "omitempty": false, "cookie": true}
        ])
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

static COUNTED_SHAPES: AtomicUsize = AtomicUsize::new(0);

struct Counted;

impl Reflect for Counted {
    fn shape() -> Shape {
        COUNTED_SHAPES.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        Plain::shape()
    }
}

#[test]
fn test_cache_computes_once_under_contention() {
    let cache = TagCache::default();
    let barrier = Barrier::new(16);

    let results: Vec<Arc<QueryTags>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache.get::<Counted>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(COUNTED_SHAPES.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|tags| Arc::ptr_eq(tags, &results[0])));
    assert_eq!(results[0].len(), 4);
}

static BROKEN_SHAPES: AtomicUsize = AtomicUsize::new(0);

struct Broken;

impl Reflect for Broken {
    fn shape() -> Shape {
        BROKEN_SHAPES.fetch_add(1, Ordering::SeqCst);
        Shape::Bool
    }
}

#[test]
fn test_cache_keeps_errors() {
    let cache = TagCache::default();
    let first = cache.get::<Broken>().unwrap_err();
    let second = cache.get::<Broken>().unwrap_err();
    assert_eq!(first, second);
    assert_eq!(BROKEN_SHAPES.load(Ordering::SeqCst), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Decode
// ─────────────────────────────────────────────────────────────────────────────

const USER_QUERY: &str = "foo=&id=1&keyword=user4%40gmail.com&name=John&age=30&emails=a%2C,b,c\
&addresses=Shanghai_China_descA_1000,Hangzhou%7C_China_descB_12300\
&ptr_addresses=Shanghai_China_descA_1000,Hangzhou%7C_China_descB_12300\
&company_address=Suzhou_China_descC_8888";

#[test]
fn test_decode_full_query() {
    let mut user = User {
        foo: "foo".into(),
        bar: "bar".into(),
        ..Default::default()
    };
    let tags = extract_tags::<User>().unwrap();
    tags.decode(USER_QUERY, &mut user).unwrap();

    // present but empty clears, absent is untouched
    assert_eq!(user.foo, "");
    assert_eq!(user.bar, "bar");

    assert_eq!(user.id, 1);
    assert_eq!(user.keyword, "user4@gmail.com");
    assert_eq!(user.name, "John");
    assert_eq!(user.age, 30);
    assert_eq!(user.emails, vec!["a,", "b", "c"]);

    let expected = vec![
        address("Shanghai", "China", "descA", 1000),
        address("Hangzhou|", "China", "descB", 12300),
    ];
    assert_eq!(user.addresses, expected);
    assert_eq!(
        user.boxed_addresses,
        expected.iter().cloned().map(Box::new).collect::<Vec<_>>()
    );
    assert_eq!(
        user.company_address,
        Some(address("Suzhou", "China", "descC", 8888))
    );
}

#[test]
fn test_decode_empty_value_resets_compound_fields() {
    let mut user = User {
        emails: vec!["x".into()],
        company_address: Some(address("A", "B", "C", 1)),
        id: 9,
        ..Default::default()
    };
    let tags = extract_tags::<User>().unwrap();
    tags.decode("emails=&company_address=&id=", &mut user).unwrap();
    assert!(user.emails.is_empty());
    assert_eq!(user.company_address, None);
    assert_eq!(user.id, 0);
}

#[test]
fn test_decode_replaces_whole_list() {
    let mut user = User {
        emails: vec!["a".into(), "b".into(), "c".into()],
        ..Default::default()
    };
    let tags = extract_tags::<User>().unwrap();
    tags.decode("emails=z", &mut user).unwrap();
    assert_eq!(user.emails, vec!["z"]);
}

#[test]
fn test_decode_last_value_wins() {
    let mut user = User::default();
    let tags = extract_tags::<User>().unwrap();
    tags.decode("name=a&name=b", &mut user).unwrap();
    assert_eq!(user.name, "b");
}

#[test]
fn test_decode_bool_forms() {
    let tags = extract_tags::<User>().unwrap();
    for (raw, expected) in [("1", true), ("t", true), ("true", true), ("0", false), ("F", false)] {
        let mut user = User::default();
        tags.decode(&format!("active={raw}"), &mut user).unwrap();
        assert_eq!(user.active, expected, "active={raw}");
    }
}

#[test]
fn test_decode_invalid_scalar_is_an_error() {
    let mut user = User::default();
    let tags = extract_tags::<User>().unwrap();
    let err = tags.decode("id=abc", &mut user).unwrap_err();
    assert!(matches!(err, QueryError::InvalidValue { expected: "int", .. }));
    assert_eq!(user, User::default());
}

#[test]
fn test_decode_rejects_semicolons() {
    let mut user = User::default();
    let tags = extract_tags::<User>().unwrap();
    assert!(matches!(
        tags.decode("id=1;name=x", &mut user),
        Err(QueryError::InvalidQuery(_))
    ));
}

#[derive(Debug, Default, Serialize)]
struct Exploding(String);

impl<'de> Deserialize<'de> for Exploding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value == "boom" {
            panic!("exploded on {value}");
        }
        Ok(Exploding(value))
    }
}

impl Reflect for Exploding {
    fn shape() -> Shape {
        Shape::String
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Fragile {
    value: Exploding,
}

impl Reflect for Fragile {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>().field(FieldShape::at::<Self, Exploding>("value", |f| &mut f.value).query("v")),
        )
    }
}

#[test]
fn test_decode_recovers_from_panics() {
    let mut fragile = Fragile::default();
    let tags = extract_tags::<Fragile>().unwrap();
    let err = tags.decode("v=boom", &mut fragile).unwrap_err();
    assert_eq!(err, QueryError::Panic("exploded on boom".into()));

    tags.decode("v=calm", &mut fragile).unwrap();
    assert_eq!(fragile.value.0, "calm");
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Paged {
    page: i64,
    note: String,
    #[serde(skip)]
    cache: i64,
}

impl Reflect for Paged {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::at::<Self, i64>("page", |p| &mut p.page).query("page"))
                .field(FieldShape::of::<String>("note"))
                .field(FieldShape::of::<i64>("cache").json("-")),
        )
    }
}

#[test]
fn test_decode_leaves_untagged_state_alone() {
    let mut paged = Paged {
        page: 1,
        note: "n".into(),
        cache: 42,
    };
    let tags = extract_tags::<Paged>().unwrap();
    tags.decode("page=3&note=overwritten", &mut paged).unwrap();
    assert_eq!(paged.page, 3);
    assert_eq!(paged.note, "n");
    assert_eq!(paged.cache, 42);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Search {
    keyword: String,
    #[serde(skip)]
    hits: usize,
}

impl Reflect for Search {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::at::<Self, String>("keyword", |s| &mut s.keyword).query("q"))
                .field(FieldShape::of::<usize>("hits").json("-")),
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Results {
    #[serde(flatten)]
    search: Search,
    total: i64,
}

impl Reflect for Results {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::embed_at::<Self, Search>("search", |r| &mut r.search))
                .field(FieldShape::at::<Self, i64>("total", |r| &mut r.total).query("total")),
        )
    }
}

#[test]
fn test_decode_through_embedded_accessor() {
    let mut results = Results {
        search: Search {
            keyword: "old".into(),
            hits: 5,
        },
        total: 1,
    };
    extract_tags::<Results>()
        .unwrap()
        .decode("q=rust&total=8", &mut results)
        .unwrap();
    assert_eq!(results.search.keyword, "rust");
    assert_eq!(results.search.hits, 5);
    assert_eq!(results.total, 8);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Described {
    title: String,
}

impl Reflect for Described {
    fn shape() -> Shape {
        Shape::Struct(StructShape::new::<Self>().field(FieldShape::of::<String>("title").query("title")))
    }
}

#[test]
fn test_decode_requires_an_accessor() {
    let mut described = Described::default();
    let tags = extract_tags::<Described>().unwrap();
    assert_eq!(
        tags.decode("title=x", &mut described),
        Err(QueryError::Unassignable("title".into()))
    );
    // keys that are absent never need one
    tags.decode("other=1", &mut described).unwrap();
}

#[test]
fn test_decode_rejects_foreign_target() {
    let mut search = Search::default();
    let tags = extract_tags::<Paged>().unwrap();
    assert!(matches!(
        tags.decode("page=2", &mut search),
        Err(QueryError::TargetMismatch { ref field, .. }) if field == "page"
    ));
}

#[test]
fn test_decode_rejects_malformed_escapes() {
    let mut user = User::default();
    let tags = extract_tags::<User>().unwrap();
    for raw in ["emails=%zz", "name=a%2", "name=%"] {
        assert!(
            matches!(tags.decode(raw, &mut user), Err(QueryError::Unescape(_))),
            "{raw}"
        );
    }
    assert_eq!(user, User::default());

    assert_eq!(unescape("a%2Cb+c").unwrap(), "a,b c");
    assert_eq!(unescape("%ff"), Err(QueryError::Unescape("%ff".into())));
}

// ─────────────────────────────────────────────────────────────────────────────
// Encode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_encode_round_trip() {
    let user = User {
        id: 7,
        keyword: "a b&c".into(),
        name: "snake_case".into(),
        age: 41,
        emails: vec!["x,y".into(), "z".into()],
        addresses: vec![address("New_York", "US", "d 1", 5)],
        boxed_addresses: vec![Box::new(address("Lyon", "FR", "", 2))],
        company_address: Some(address("Paris", "FR", "hq", 3)),
        active: true,
        foo: "f".into(),
        bar: String::new(),
    };

    let encoded = encode(&user).unwrap();
    let mut decoded = User::default();
    extract_tags::<User>()
        .unwrap()
        .decode(&encoded.to_query_string(), &mut decoded)
        .unwrap();
    assert_eq!(decoded, user);
}

#[test]
fn test_encode_struct_tokens_follow_sorted_keys() {
    let user = User {
        company_address: Some(address("Suzhou", "China", "descC", 8888)),
        ..Default::default()
    };
    let encoded = encode(&user).unwrap();
    assert_eq!(encoded.get("company_address"), Some("Suzhou_China_descC_8888"));
    assert_eq!(encoded.get("id"), Some("0"));
    assert_eq!(encoded.get("active"), None);
}

#[test]
fn test_encode_escapes_underscores() {
    let user = User {
        name: "a_b".into(),
        ..Default::default()
    };
    let encoded = encode(&user).unwrap();
    assert_eq!(encoded.get("name"), Some("a%5Fb"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Bare method
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct Listing {
    page: u32,
    filter: String,
}

impl Reflect for Listing {
    fn shape() -> Shape {
        Shape::Struct(
            StructShape::new::<Self>()
                .field(FieldShape::at::<Self, u32>("page", |l| &mut l.page).query("page,omitempty"))
                .field(FieldShape::at::<Self, String>("filter", |l| &mut l.filter).query(";method:bare,f_")),
        )
    }
}

#[test]
fn test_bare_method_collects_prefixed_keys() {
    let mut listing = Listing::default();
    extract_tags::<Listing>()
        .unwrap()
        .decode("f_status=active&page=2&f_name=a%20b&other=1", &mut listing)
        .unwrap();
    assert_eq!(listing.page, 2);
    assert_eq!(listing.filter, "f_name=a+b&f_status=active");
}

#[test]
fn test_bare_method_encodes_fragments_verbatim() {
    let listing = Listing {
        page: 0,
        filter: "f_name=a+b&f_status=active".into(),
    };
    assert_eq!(
        encode(&listing).unwrap().to_query_string(),
        "f_name=a+b&f_status=active"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Subsets
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_is_raw_query_subset() {
    let sup = "id=1&name=John&age=30&emails=a%2C,b,c";
    assert!(is_raw_query_subset(sup, "id=1&name=John&age=30"));
    assert!(is_raw_query_subset(sup, "id=1&name=John&age=30&emails=a%2C,b"));
    assert!(is_raw_query_subset(sup, "id=1&name=John&age=30&emails=a%2C,b,c"));
    // only the last value of a repeated key counts
    assert!(is_raw_query_subset(
        sup,
        "id=1&name=John&age=30&emails=a%2C&emails=b&emails=c"
    ));
    assert!(!is_raw_query_subset(
        sup,
        "id=1&name=John&age=30&emails=a%2C&emails=b&emails=d"
    ));
    assert!(!is_raw_query_subset(
        sup,
        "id=1&name=John&age=30&emails=a%2C,b,c&addresses=Shanghai"
    ));
}
