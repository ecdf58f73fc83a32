//! Declarative service descriptions, as authored by the caller.
//!
//! # Design
//! A `ServiceDescriptor` is the raw, unvalidated declaration of a group of
//! remote operations. It is either assembled with the builder API or loaded
//! from JSON through serde. Nothing here is checked; the `Resolver` turns a
//! descriptor into validated `metadata` exactly once per descriptor identity.
//!
//! Two vocabularies exist for the same bindings (`field`/`api_field`,
//! `path`/`api_path`, ...). They are serde aliases of one `BindingKind`, so
//! either spelling produces the same metadata.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::http::HttpMethod;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a service descriptor.
///
/// Clones of a descriptor share the id; every fresh construction or
/// deserialization gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(u64);

impl ServiceId {
    pub fn next() -> Self {
        ServiceId(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        ServiceId::next()
    }
}

/// How one call argument is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Substitutes a `{name}` placeholder in the path template.
    #[serde(alias = "api_path", alias = "path_segment")]
    Path,
    #[serde(alias = "api_query")]
    Query,
    #[serde(alias = "api_query_map")]
    QueryMap,
    /// Form field; sent in the body for verbs that carry one, else in the query.
    #[serde(alias = "api_field", alias = "form_field")]
    Field,
    #[serde(alias = "api_field_map")]
    FieldMap,
    #[serde(alias = "api_header")]
    Header,
    #[serde(alias = "api_header_map")]
    HeaderMap,
    /// Whole request body, encoded by the codec.
    #[serde(alias = "api_body")]
    Body,
    /// One part of a multipart body. A scalar becomes a text part; an object
    /// `{"content", "filename"?, "content_type"?}` becomes a file part.
    #[serde(alias = "api_part")]
    Part,
    #[serde(alias = "api_part_map")]
    PartMap,
}

impl BindingKind {
    pub fn is_map(self) -> bool {
        matches!(
            self,
            BindingKind::QueryMap
                | BindingKind::FieldMap
                | BindingKind::HeaderMap
                | BindingKind::PartMap
        )
    }

    pub fn is_form(self) -> bool {
        matches!(self, BindingKind::Field | BindingKind::FieldMap)
    }

    pub fn is_part(self) -> bool {
        matches!(self, BindingKind::Part | BindingKind::PartMap)
    }
}

/// Declared type of a call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Bool,
    List,
    Map,
    Any,
}

impl ValueKind {
    /// Whether `value` is acceptable for this kind. Null is checked elsewhere.
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (ValueKind::Any, _) => true,
            (ValueKind::String, Value::String(_)) => true,
            (ValueKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ValueKind::Float, Value::Number(_)) => true,
            (ValueKind::Bool, Value::Bool(_)) => true,
            (ValueKind::List, Value::Array(_)) => true,
            (ValueKind::Map, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// Whether a method hands back its value directly or through an `AsyncHandle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    #[default]
    Sync,
    Async,
}

impl ReturnShape {
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnShape::Sync => "sync",
            ReturnShape::Async => "async",
        }
    }
}

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    #[serde(default)]
    pub name: String,
    pub kind: BindingKind,
    #[serde(default = "any_kind", rename = "type")]
    pub value_type: ValueKind,
    /// The argument is already URL-encoded and is sent verbatim.
    #[serde(default)]
    pub encoded: bool,
}

fn any_kind() -> ValueKind {
    ValueKind::Any
}

impl ParamDecl {
    pub fn new(name: &str, kind: BindingKind, value_type: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value_type,
            encoded: false,
        }
    }

    pub fn path(name: &str, value_type: ValueKind) -> Self {
        Self::new(name, BindingKind::Path, value_type)
    }

    pub fn query(name: &str, value_type: ValueKind) -> Self {
        Self::new(name, BindingKind::Query, value_type)
    }

    pub fn query_map() -> Self {
        Self::new("", BindingKind::QueryMap, ValueKind::Map)
    }

    pub fn field(name: &str, value_type: ValueKind) -> Self {
        Self::new(name, BindingKind::Field, value_type)
    }

    pub fn field_map() -> Self {
        Self::new("", BindingKind::FieldMap, ValueKind::Map)
    }

    pub fn header(name: &str, value_type: ValueKind) -> Self {
        Self::new(name, BindingKind::Header, value_type)
    }

    pub fn header_map() -> Self {
        Self::new("", BindingKind::HeaderMap, ValueKind::Map)
    }

    pub fn part(name: &str, value_type: ValueKind) -> Self {
        Self::new(name, BindingKind::Part, value_type)
    }

    pub fn part_map() -> Self {
        Self::new("", BindingKind::PartMap, ValueKind::Map)
    }

    pub fn body() -> Self {
        Self::new("body", BindingKind::Body, ValueKind::Any)
    }

    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }
}

/// One declared remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    /// Normally exactly one entry; the resolver rejects anything else.
    #[serde(default, alias = "verb", deserialize_with = "one_or_many")]
    pub verbs: Vec<HttpMethod>,
    #[serde(default)]
    pub path: String,
    /// `"Name: value"` lines.
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub returns: ReturnShape,
    /// Send parts as a `multipart/form-data` body. POST only.
    #[serde(default, alias = "is_multipart")]
    pub multipart: bool,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<HttpMethod>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(HttpMethod),
        Many(Vec<HttpMethod>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(verb) => vec![verb],
        OneOrMany::Many(verbs) => verbs,
    })
}

impl MethodDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verbs: Vec::new(),
            path: String::new(),
            headers: Vec::new(),
            params: Vec::new(),
            returns: ReturnShape::Sync,
            multipart: false,
        }
    }

    pub fn with(name: &str, verb: HttpMethod, path: &str) -> Self {
        Self::new(name).verb(verb).path(path)
    }

    pub fn get(name: &str, path: &str) -> Self {
        Self::with(name, HttpMethod::Get, path)
    }

    pub fn post(name: &str, path: &str) -> Self {
        Self::with(name, HttpMethod::Post, path)
    }

    pub fn put(name: &str, path: &str) -> Self {
        Self::with(name, HttpMethod::Put, path)
    }

    pub fn patch(name: &str, path: &str) -> Self {
        Self::with(name, HttpMethod::Patch, path)
    }

    pub fn delete(name: &str, path: &str) -> Self {
        Self::with(name, HttpMethod::Delete, path)
    }

    pub fn verb(mut self, verb: HttpMethod) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn header(mut self, line: &str) -> Self {
        self.headers.push(line.to_string());
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn asynchronous(self) -> Self {
        self.returns(ReturnShape::Async)
    }

    pub fn multipart(mut self) -> Self {
        self.multipart = true;
        self
    }
}

/// Declarative definition of a set of remote operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(skip)]
    id: ServiceId,
    pub name: String,
    /// Relative path appended to the client's api url, or an absolute
    /// `http(s)://` url that replaces it.
    #[serde(default, alias = "api_url")]
    pub base_path: String,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

impl ServiceDescriptor {
    pub fn builder(name: &str) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.to_string(),
            base_path: String::new(),
            methods: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }
}

/// Assembles a `ServiceDescriptor` in code.
#[derive(Debug, Clone)]
pub struct ServiceDescriptorBuilder {
    name: String,
    base_path: String,
    methods: Vec<MethodDecl>,
}

impl ServiceDescriptorBuilder {
    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> ServiceDescriptor {
        ServiceDescriptor {
            id: ServiceId::next(),
            name: self.name,
            base_path: self.base_path,
            methods: self.methods,
        }
    }
}
