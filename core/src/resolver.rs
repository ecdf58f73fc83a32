//! Validates service descriptors and caches the resulting metadata.
//!
//! # Design
//! Resolution runs at most once per `ServiceId`. The cache maps each id to a
//! `OnceLock` cell; the map lock is held only long enough to fetch or insert
//! the cell, and validation then runs inside `OnceLock::get_or_init`, which
//! blocks concurrent first users of the same descriptor until the single
//! initializer publishes its result. Failures are cached too: a descriptor
//! that fails validation stays unusable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::descriptor::{BindingKind, MethodDecl, ServiceDescriptor, ServiceId, ValueKind};
use crate::error::{DescriptorError, Violation};
use crate::http::{header_problem, Headers, HttpMethod};
use crate::metadata::{MethodDescriptor, ParameterBinding, PathTemplate, ResolvedService};

type Resolution = Result<Arc<ResolvedService>, DescriptorError>;

static GLOBAL: LazyLock<Arc<Resolver>> = LazyLock::new(|| Arc::new(Resolver::new()));

/// Resolve-once cache of validated service metadata.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: Mutex<HashMap<ServiceId, Arc<OnceLock<Resolution>>>>,
    resolutions: AtomicUsize,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide resolver used by clients that do not supply one.
    ///
    /// Its cache only grows: every distinct descriptor resolved through it
    /// keeps an entry for the life of the process. Build each descriptor once
    /// and reuse it (clones share the entry), or give short-lived descriptors
    /// a dedicated `Resolver` that is dropped with them.
    pub fn global() -> Arc<Resolver> {
        Arc::clone(&GLOBAL)
    }

    /// Validate `descriptor`, or return the cached outcome of an earlier
    /// resolution of the same descriptor.
    pub fn resolve(&self, descriptor: &ServiceDescriptor) -> Resolution {
        let cell = {
            let mut cache = self.cache.lock();
            Arc::clone(cache.entry(descriptor.id()).or_default())
        };
        cell.get_or_init(|| {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            let resolved = validate(descriptor).map(Arc::new);
            match &resolved {
                Ok(service) => debug!(
                    service = %descriptor.name,
                    methods = service.methods().len(),
                    "resolved service descriptor"
                ),
                Err(err) => warn!(error = %err, "service descriptor rejected"),
            }
            resolved
        })
        .clone()
    }

    /// Number of validation passes actually executed.
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

fn validate(descriptor: &ServiceDescriptor) -> Result<ResolvedService, DescriptorError> {
    let mut seen = HashSet::new();
    let mut methods = Vec::with_capacity(descriptor.methods.len());
    for decl in &descriptor.methods {
        if !seen.insert(decl.name.as_str()) {
            return Err(fail(descriptor, decl, Violation::DuplicateMethod));
        }
        methods.push(resolve_method(descriptor, decl).map_err(|v| fail(descriptor, decl, v))?);
    }
    Ok(ResolvedService::new(
        descriptor.id(),
        descriptor.name.clone(),
        methods,
    ))
}

fn fail(descriptor: &ServiceDescriptor, decl: &MethodDecl, violation: Violation) -> DescriptorError {
    DescriptorError {
        service: descriptor.name.clone(),
        method: decl.name.clone(),
        violation,
    }
}

fn resolve_method(
    descriptor: &ServiceDescriptor,
    decl: &MethodDecl,
) -> Result<MethodDescriptor, Violation> {
    let verb = match decl.verbs.as_slice() {
        [] => return Err(Violation::MissingVerb),
        [verb] => *verb,
        verbs => return Err(Violation::MultipleVerbs { count: verbs.len() }),
    };

    let path = PathTemplate::parse(&decl.path)
        .map_err(|reason| Violation::MalformedTemplate { reason })?;

    if decl.multipart && verb != HttpMethod::Post {
        return Err(multipart(format!("requires POST, not {verb}")));
    }

    let headers = parse_headers(descriptor, decl)?;

    let mut bindings = Vec::with_capacity(decl.params.len());
    let mut bound = HashSet::new();
    let mut has_body = false;
    let mut has_form = false;

    for (index, param) in decl.params.iter().enumerate() {
        let invalid = |reason: &str| Violation::InvalidParameter {
            index,
            reason: reason.to_string(),
        };

        if param.kind.is_map() {
            if !param.name.is_empty() {
                return Err(invalid("map bindings must not be named"));
            }
            if param.value_type != ValueKind::Map {
                return Err(invalid("map bindings require a map value type"));
            }
        } else if param.kind != BindingKind::Body {
            if param.name.trim().is_empty() {
                return Err(invalid("binding name must not be empty"));
            }
            if param.value_type == ValueKind::Map && param.kind != BindingKind::Part {
                return Err(invalid("map values need a map binding"));
            }
        }

        if param.kind.is_part() && !decl.multipart {
            return Err(multipart("part bindings need a multipart method".to_string()));
        }
        if decl.multipart && param.kind.is_form() {
            return Err(multipart("form fields are not allowed, use parts".to_string()));
        }
        if decl.multipart && param.kind == BindingKind::Body {
            return Err(multipart("a body binding is not allowed".to_string()));
        }

        match param.kind {
            BindingKind::Path => {
                if !path.placeholders().any(|p| p == param.name) {
                    return Err(Violation::UnknownPlaceholder {
                        name: param.name.clone(),
                    });
                }
                if !bound.insert(param.name.as_str()) {
                    return Err(Violation::DuplicatePathBinding {
                        placeholder: param.name.clone(),
                    });
                }
            }
            BindingKind::Body => {
                if has_body {
                    return Err(Violation::BodyConflict {
                        reason: "more than one body binding".to_string(),
                    });
                }
                if !verb.has_body() {
                    return Err(Violation::BodyConflict {
                        reason: format!("{verb} requests carry no body"),
                    });
                }
                has_body = true;
            }
            BindingKind::Header => {
                if header_problem(&param.name, "").is_some() {
                    return Err(invalid("header name is not a token"));
                }
            }
            kind if kind.is_form() => has_form = true,
            _ => {}
        }

        bindings.push(ParameterBinding {
            name: param.name.clone(),
            kind: param.kind,
            value_type: param.value_type,
            encoded: param.encoded,
        });
    }

    if has_body && has_form {
        return Err(Violation::BodyConflict {
            reason: "body binding combined with form fields".to_string(),
        });
    }

    if let Some(placeholder) = path.placeholders().find(|p| !bound.contains(p)) {
        return Err(Violation::UnboundPlaceholder {
            placeholder: placeholder.to_string(),
        });
    }

    Ok(MethodDescriptor {
        service: descriptor.name.clone(),
        name: decl.name.clone(),
        verb,
        base_path: descriptor.base_path.clone(),
        path,
        headers,
        bindings,
        returns: decl.returns,
        multipart: decl.multipart,
    })
}

fn multipart(reason: String) -> Violation {
    Violation::Multipart { reason }
}

fn parse_headers(descriptor: &ServiceDescriptor, decl: &MethodDecl) -> Result<Headers, Violation> {
    let mut headers = Headers::new();
    for line in &decl.headers {
        let malformed = || Violation::MalformedHeader { line: line.clone() };
        let (name, value) = line.split_once(':').ok_or_else(malformed)?;
        let (name, value) = (name.trim(), value.trim());
        if value.is_empty() || header_problem(name, value).is_some() {
            return Err(malformed());
        }
        if let Some(previous) = headers.set(name, value) {
            if previous != value {
                warn!(
                    service = %descriptor.name,
                    method = %decl.name,
                    header = name,
                    previous = %previous,
                    value,
                    "conflicting static header, last declaration wins"
                );
            }
        }
    }
    Ok(headers)
}
