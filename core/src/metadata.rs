//! Validated, immutable metadata produced by the `Resolver`.
//!
//! A `ResolvedService` is shared read-only through `Arc` across every caller
//! of the service; nothing in it changes after resolution.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::{BindingKind, ReturnShape, ServiceId, ValueKind};
use crate::http::{Headers, HttpMethod};

/// One piece of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A path such as `post/{id}/comments`, split into literals and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Split `raw` at `{name}` placeholders.
    ///
    /// Placeholder names start with a letter and continue with letters,
    /// digits, `_` or `-`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        if c == '{' {
                            return Err(format!("nested `{{` in `{raw}`"));
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(format!("unclosed `{{` in `{raw}`"));
                    }
                    if !is_placeholder_name(&name) {
                        return Err(format!("invalid placeholder name `{name}`"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(format!("unmatched `}}` in `{raw}`")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder through `lookup`. Returns `None` if any
    /// placeholder has no value.
    pub fn render<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => out.push_str(lookup(name)?),
            }
        }
        Some(out)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// The transmission contract of one call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub name: String,
    pub kind: BindingKind,
    pub value_type: ValueKind,
    pub encoded: bool,
}

/// One validated remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub service: String,
    pub name: String,
    pub verb: HttpMethod,
    pub base_path: String,
    pub path: PathTemplate,
    pub headers: Headers,
    pub bindings: Vec<ParameterBinding>,
    pub returns: ReturnShape,
    /// Parts are sent as a `multipart/form-data` body.
    pub multipart: bool,
}

/// All validated methods of one service descriptor.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedService {
    id: ServiceId,
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
    index: HashMap<String, usize>,
}

impl ResolvedService {
    pub(crate) fn new(id: ServiceId, name: String, methods: Vec<MethodDescriptor>) -> Self {
        let index = methods
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Self {
            id,
            name,
            methods: methods.into_iter().map(Arc::new).collect(),
            index,
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.index.get(name).map(|&i| &self.methods[i])
    }
}
