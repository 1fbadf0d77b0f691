//! # Request Templates
//!
//! A template is the mutable, protocol-neutral shape of one outbound request
//! before it is sent: method, path, query, headers and body, where path,
//! query and header values may contain `{name}` expressions.
//!
//! ## Expansion rules
//! - Path expressions always expand; unresolved ones become empty.
//! - A query or header value consisting of one expression expands to one
//!   value per variable value; an unresolved one is dropped.
//! - A query or header with no values left after expansion is dropped.
//! - Expanded query and path values are percent-encoded; literals are kept.

use std::collections::BTreeMap;

use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use percent_encoding::utf8_percent_encode;
use polywire::Headers;

use crate::request::HttpMethod;
use crate::request::Request;

/// Variable name to expanded string values.
pub type Variables = BTreeMap<String, Vec<String>>;

const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');
const PATH: &AsciiSet = &COMPONENT.remove(b'/');

/// Percent-encodes a query name or value.
pub fn encode_query_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

fn encode_path(raw: &str) -> String {
    utf8_percent_encode(raw, PATH).to_string()
}

enum Chunk<'a> {
    Literal(&'a str),
    Expr(&'a str),
}

fn chunks(template: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        if open > 0 {
            out.push(Chunk::Literal(&rest[..open]));
        }
        out.push(Chunk::Expr(rest[open + 1..open + close].trim()));
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        out.push(Chunk::Literal(rest));
    }
    out
}

/// Expands one value template. `None` means every expression in it was unresolved.
fn expand(template: &str, vars: &Variables, encode: fn(&str) -> String) -> Option<Vec<String>> {
    let parts = chunks(template);
    if let [Chunk::Expr(name)] = parts.as_slice() {
        let values = vars.get(*name).filter(|v| !v.is_empty())?;
        return Some(values.iter().map(|v| encode(v)).collect());
    }

    let mut has_expr = false;
    let mut resolved = false;
    let mut out = String::new();
    for part in parts {
        match part {
            Chunk::Literal(text) => out.push_str(text),
            Chunk::Expr(name) => {
                has_expr = true;
                if let Some(values) = vars.get(name).filter(|v| !v.is_empty()) {
                    resolved = true;
                    let joined: Vec<String> = values.iter().map(|v| encode(v)).collect();
                    out.push_str(&joined.join(","));
                }
            }
        }
    }
    if has_expr && !resolved {
        None
    } else {
        Some(vec![out])
    }
}

fn identity(raw: &str) -> String {
    raw.to_string()
}

/// The mutable builder for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    method: HttpMethod,
    target: String,
    path: String,
    queries: Vec<(String, Vec<String>)>,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl RequestTemplate {
    /// Creates a template from a path that may carry a query part,
    /// e.g. `/users/{id}?expand={expand}`.
    pub fn new(method: HttpMethod, uri: &str) -> Self {
        let mut template = Self {
            method,
            target: String::new(),
            path: String::new(),
            queries: Vec::new(),
            headers: Headers::new(),
            body: None,
        };
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        template.path = path.to_string();
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            template.query(name, [value]);
        }
        template
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        self.method = method;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn queries(&self) -> &[(String, Vec<String>)] {
        &self.queries
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: Option<Vec<u8>>) {
        self.body = body;
    }

    /// Inserts a literal prefix in front of the path.
    pub fn insert_prefix(&mut self, prefix: &str) {
        self.path.insert_str(0, prefix);
    }

    /// Appends values to a query parameter, creating it if absent.
    pub fn query<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into);
        match self.queries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.extend(values),
            None => self.queries.push((name.to_string(), values.collect())),
        }
    }

    pub fn has_query(&self, name: &str) -> bool {
        self.queries.iter().any(|(n, _)| n == name)
    }

    /// The first value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.queries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }

    /// Appends values to a header.
    pub fn header<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        for value in values {
            self.headers.append(name, value);
        }
    }

    /// Expands every expression against `vars`.
    pub fn resolve(&self, vars: &Variables) -> RequestTemplate {
        let path: String = chunks(&self.path)
            .into_iter()
            .map(|chunk| match chunk {
                Chunk::Literal(text) => text.to_string(),
                Chunk::Expr(name) => vars
                    .get(name)
                    .map(|values| values.iter().map(|v| encode_path(v)).collect::<Vec<_>>().join(","))
                    .unwrap_or_default(),
            })
            .collect();

        let mut queries = Vec::new();
        for (name, templates) in &self.queries {
            let values: Vec<String> = templates
                .iter()
                .filter_map(|t| expand(t, vars, encode_query_component))
                .flatten()
                .collect();
            if !values.is_empty() || templates.is_empty() {
                queries.push((name.clone(), values));
            }
        }

        let mut headers = Headers::new();
        for (name, templates) in self.headers.iter() {
            let values: Vec<String> = templates
                .iter()
                .filter_map(|t| expand(t, vars, identity))
                .flatten()
                .collect();
            if !values.is_empty() {
                headers.set(name, values);
            }
        }

        RequestTemplate {
            method: self.method,
            target: self.target.clone(),
            path,
            queries,
            headers,
            body: self.body.clone(),
        }
    }

    /// Sets the base URL unless the path is already absolute.
    pub fn apply_target(&mut self, base: &str) {
        if !self.path.contains("://") {
            self.target = base.trim_end_matches('/').to_string();
        }
    }

    /// The full URL: target, path and query string.
    pub fn url(&self) -> String {
        let mut url = format!("{}{}", self.target, self.path);
        let query: Vec<String> = self
            .queries
            .iter()
            .flat_map(|(name, values)| {
                if values.is_empty() {
                    vec![name.clone()]
                } else {
                    values.iter().map(|v| format!("{name}={v}")).collect()
                }
            })
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    /// Freezes the template into a request.
    pub fn request(&self) -> Request {
        Request {
            method: self.method,
            url: self.url(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}
