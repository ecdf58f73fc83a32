//! Materializes a `ResolvedRequest` from method metadata and call arguments.
//!
//! # Design
//! `RequestBuilder` holds only borrowed configuration (api url and codec).
//! Every `build` call allocates its own `BuildContext`, so concurrent
//! invocations of the same method share nothing mutable. Arguments are
//! `serde_json::Value`s matched positionally against the method's bindings;
//! `Value::Null` means "absent" and is omitted from query strings, forms and
//! headers rather than sent as an empty string.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use tracing::debug;

use crate::codec::Codec;
use crate::descriptor::BindingKind;
use crate::error::BindingError;
use crate::http::{header_problem, Headers, ResolvedRequest};
use crate::metadata::{MethodDescriptor, ParameterBinding};
use crate::multipart::{self, Part};

/// Characters escaped in a single path segment, `/` and `%` included.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builds requests for any method against one api url and codec.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a, C> {
    api_url: Option<&'a str>,
    codec: &'a C,
}

impl<'a, C: Codec> RequestBuilder<'a, C> {
    pub fn new(api_url: Option<&'a str>, codec: &'a C) -> Self {
        Self { api_url, codec }
    }

    pub fn build(
        &self,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<ResolvedRequest, BindingError> {
        if args.len() != method.bindings.len() {
            return Err(BindingError::ArgumentCount {
                method: method.name.clone(),
                expected: method.bindings.len(),
                actual: args.len(),
            });
        }

        let mut ctx = BuildContext::new(method);
        for (binding, value) in method.bindings.iter().zip(args) {
            ctx.bind(binding, value, self.codec)?;
        }
        let request = ctx.finish(self.api_url);
        if let Ok(request) = &request {
            debug!(
                method = %method.name,
                verb = %request.method,
                url = %request.url,
                body_len = request.body_len(),
                "built request"
            );
        }
        request
    }
}

/// A name/value pair; `raw` values are already URL-encoded.
struct Pair {
    name: String,
    value: String,
    raw: bool,
}

struct BuildContext<'m> {
    method: &'m MethodDescriptor,
    path_values: HashMap<&'m str, String>,
    query: Vec<Pair>,
    form: Vec<Pair>,
    parts: Vec<Part>,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl<'m> BuildContext<'m> {
    fn new(method: &'m MethodDescriptor) -> Self {
        Self {
            method,
            path_values: HashMap::new(),
            query: Vec::new(),
            form: Vec::new(),
            parts: Vec::new(),
            headers: method.headers.clone(),
            body: None,
        }
    }

    fn bind<C: Codec>(
        &mut self,
        binding: &'m ParameterBinding,
        value: &Value,
        codec: &C,
    ) -> Result<(), BindingError> {
        if value.is_null() {
            return match binding.kind {
                BindingKind::Query
                | BindingKind::Field
                | BindingKind::Header
                | BindingKind::Part => Ok(()),
                _ => Err(self.missing(binding)),
            };
        }
        if !binding.value_type.accepts(value) {
            return Err(self.mismatch(binding, value));
        }

        match binding.kind {
            BindingKind::Path => {
                let text = self.scalar(binding, value)?;
                let segment = if binding.encoded {
                    text
                } else {
                    utf8_percent_encode(&text, PATH_SEGMENT).to_string()
                };
                self.path_values.insert(binding.name.as_str(), segment);
            }
            BindingKind::Query => {
                let pairs = self.expand(binding, &binding.name, value)?;
                self.query.extend(pairs);
            }
            BindingKind::Field => {
                let pairs = self.expand(binding, &binding.name, value)?;
                self.form.extend(pairs);
            }
            BindingKind::QueryMap => {
                let pairs = self.expand_map(binding, value)?;
                self.query.extend(pairs);
            }
            BindingKind::FieldMap => {
                let pairs = self.expand_map(binding, value)?;
                self.form.extend(pairs);
            }
            BindingKind::Header => {
                let text = self.scalar(binding, value)?;
                self.set_header(&binding.name, &text)?;
            }
            BindingKind::HeaderMap => {
                for (name, entry) in self.entries(binding, value)? {
                    let text = self.scalar(binding, entry)?;
                    self.set_header(name, &text)?;
                }
            }
            BindingKind::Part => {
                let part = self.part(binding, &binding.name, value)?;
                self.parts.push(part);
            }
            BindingKind::PartMap => {
                for (name, entry) in self.entries(binding, value)? {
                    let part = self.part(binding, name, entry)?;
                    self.parts.push(part);
                }
            }
            BindingKind::Body => {
                let bytes = codec.encode(value).map_err(|e| BindingError::Encode {
                    method: self.method.name.clone(),
                    reason: e.0,
                })?;
                self.body = Some(bytes);
                if !self.headers.contains("Content-Type") {
                    self.headers.set("Content-Type", codec.content_type());
                }
            }
        }
        Ok(())
    }

    fn finish(mut self, api_url: Option<&str>) -> Result<ResolvedRequest, BindingError> {
        let method = self.method;
        let path = method
            .path
            .render(|name| self.path_values.get(name).map(String::as_str))
            .ok_or_else(|| BindingError::MissingArgument {
                method: method.name.clone(),
                name: method.path.placeholders().next().unwrap_or_default().to_string(),
            })?;
        if is_traversal(&path) {
            return Err(BindingError::PathTraversal {
                method: method.name.clone(),
                value: path,
            });
        }
        let mut url = join_url(api_url, &method.base_path, &path);

        if !self.parts.is_empty() {
            let boundary = multipart::boundary();
            self.body = Some(multipart::encode(&boundary, &self.parts));
            self.headers
                .set("Content-Type", &multipart::content_type(&boundary));
        }

        if method.verb.has_body() {
            if !self.form.is_empty() {
                self.body = Some(encode_pairs(&self.form).into_bytes());
                if !self.headers.contains("Content-Type") {
                    self.headers.set("Content-Type", FORM_CONTENT_TYPE);
                }
            }
            if self.body.is_none() {
                self.body = Some(Vec::new());
            }
        } else {
            self.query.append(&mut self.form);
        }

        if !self.query.is_empty() {
            match url.find('?') {
                None => url.push('?'),
                Some(i) if i + 1 == url.len() => {}
                Some(_) => url.push('&'),
            }
            url.push_str(&encode_pairs(&self.query));
        }

        Ok(ResolvedRequest {
            method: method.verb,
            url,
            headers: self.headers,
            body: self.body,
        })
    }

    /// Query/form pairs for one argument; lists repeat the name.
    fn expand(
        &self,
        binding: &ParameterBinding,
        name: &str,
        value: &Value,
    ) -> Result<Vec<Pair>, BindingError> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        };
        items
            .into_iter()
            .map(|item| {
                Ok(Pair {
                    name: name.to_string(),
                    value: self.scalar(binding, item)?,
                    raw: binding.encoded,
                })
            })
            .collect()
    }

    fn expand_map(&self, binding: &ParameterBinding, value: &Value) -> Result<Vec<Pair>, BindingError> {
        let mut pairs = Vec::new();
        for (name, entry) in self.entries(binding, value)? {
            pairs.extend(self.expand(binding, name, entry)?);
        }
        Ok(pairs)
    }

    /// Entries of a map argument; a null entry is an error.
    fn entries<'v>(
        &self,
        binding: &ParameterBinding,
        value: &'v Value,
    ) -> Result<Vec<(&'v str, &'v Value)>, BindingError> {
        let Value::Object(map) = value else {
            return Err(self.mismatch(binding, value));
        };
        map.iter()
            .map(|(key, entry)| {
                if entry.is_null() {
                    Err(BindingError::NullMapEntry {
                        method: self.method.name.clone(),
                        name: binding.name.clone(),
                        key: key.clone(),
                    })
                } else {
                    Ok((key.as_str(), entry))
                }
            })
            .collect()
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), BindingError> {
        if let Some(reason) = header_problem(name, value) {
            return Err(BindingError::InvalidHeader {
                method: self.method.name.clone(),
                name: name.to_string(),
                reason,
            });
        }
        self.headers.set(name, value);
        Ok(())
    }

    /// A scalar becomes a text part; `{"content", "filename"?, "content_type"?}`
    /// becomes a file part.
    fn part(&self, binding: &ParameterBinding, name: &str, value: &Value) -> Result<Part, BindingError> {
        let Value::Object(map) = value else {
            return Ok(Part::text(name, self.scalar(binding, value)?));
        };
        let text = |key: &str| -> Result<Option<String>, BindingError> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(self.mismatch(binding, other)),
            }
        };
        let content = text("content")?.ok_or_else(|| self.missing(binding))?;
        let filename = text("filename")?;
        let content_type = match text("content_type")? {
            Some(content_type) => {
                if let Some(reason) = header_problem("Content-Type", &content_type) {
                    return Err(BindingError::InvalidHeader {
                        method: self.method.name.clone(),
                        name: format!("{name}: Content-Type"),
                        reason,
                    });
                }
                Some(content_type)
            }
            None if filename.is_some() => Some("application/octet-stream".to_string()),
            None => None,
        };
        Ok(Part {
            name: name.to_string(),
            filename,
            content_type,
            content: content.into_bytes(),
        })
    }

    fn scalar(&self, binding: &ParameterBinding, value: &Value) -> Result<String, BindingError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(self.mismatch(binding, value)),
        }
    }

    fn missing(&self, binding: &ParameterBinding) -> BindingError {
        BindingError::MissingArgument {
            method: self.method.name.clone(),
            name: binding.name.clone(),
        }
    }

    fn mismatch(&self, binding: &ParameterBinding, value: &Value) -> BindingError {
        BindingError::TypeMismatch {
            method: self.method.name.clone(),
            name: binding.name.clone(),
            expected: binding.value_type,
            actual: json_type(value),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn encode_pairs(pairs: &[Pair]) -> String {
    let encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    pairs
        .iter()
        .map(|pair| {
            let value = if pair.raw {
                pair.value.clone()
            } else {
                encode(&pair.value)
            };
            format!("{}={}", encode(&pair.name), value)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Whether the path part of `path` has a `.` or `..` segment, `%2e` included.
fn is_traversal(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/').any(|piece| {
        let piece = piece.to_ascii_lowercase().replace("%2e", ".");
        piece == "." || piece == ".."
    })
}

pub(crate) fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join url parts with exactly one `/` between them. An absolute base path
/// replaces the api url.
fn join_url(api_url: Option<&str>, base_path: &str, path: &str) -> String {
    let root = if is_http_url(base_path) { None } else { api_url };
    let mut url = String::new();
    for part in root.into_iter().chain([base_path, path]) {
        if part.is_empty() {
            continue;
        }
        if url.is_empty() {
            url.push_str(part);
            continue;
        }
        match (url.ends_with('/'), part.starts_with('/')) {
            (true, true) => url.push_str(&part[1..]),
            (false, false) => {
                url.push('/');
                url.push_str(part);
            }
            _ => url.push_str(part),
        }
    }
    url
}
