//! # Method Metadata
//!
//! The static description of one remote method: how each positional
//! argument binds into a request, what the method returns, and the
//! invocation key that names it on the wire. Built once when a client is
//! created, never per call.

use std::fmt;
use std::sync::Arc;

use polywire::Value;
use polywire::ValueType;
use polywire::Wire;

use crate::error::ContractError;
use crate::request::HttpMethod;
use crate::template::RequestTemplate;

/// Renders an argument value into the strings placed in a URL or header.
pub trait Expander: Send + Sync {
    fn expand(&self, value: &Value) -> Option<String>;
}

/// Renders scalars with their plain text form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringExpander;

impl Expander for ToStringExpander {
    fn expand(&self, value: &Value) -> Option<String> {
        value.to_plain_string()
    }
}

/// How one positional argument binds into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamBinding {
    /// Not bound; only travels in an RPC args body.
    None,
    Path(String),
    Query(String),
    Header(String),
    Form(String),
    Body,
    /// A free-form URI inserted in front of the path.
    Url,
    /// A key to value(s) map expanded into query parameters.
    QueryMap { encoded: bool },
    /// A key to value(s) map expanded into headers.
    HeaderMap,
}

impl ParamBinding {
    /// The template variable this binding fills, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            ParamBinding::Path(n) | ParamBinding::Query(n) | ParamBinding::Header(n) | ParamBinding::Form(n) => Some(n),
            _ => None,
        }
    }
}

/// One declared parameter.
#[derive(Clone)]
pub struct Param {
    pub binding: ParamBinding,
    pub ty: ValueType,
    pub expander: Arc<dyn Expander>,
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("binding", &self.binding)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// The static description of a remote method.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    type_name: String,
    method_name: String,
    invocation_key: String,
    config_key: String,
    template: RequestTemplate,
    params: Vec<Param>,
    return_type: ValueType,
    body_index: Option<usize>,
    url_index: Option<usize>,
    query_map_index: Option<usize>,
    header_map_index: Option<usize>,
}

impl MethodMetadata {
    pub fn builder(type_name: impl Into<String>, method_name: impl Into<String>) -> MethodMetadataBuilder {
        MethodMetadataBuilder {
            type_name: type_name.into(),
            method_name: method_name.into(),
            invocation_key: None,
            http_method: HttpMethod::Get,
            path: String::new(),
            headers: Vec::new(),
            params: Vec::new(),
            return_type: ValueType::Unit,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// `{type}.{method}` unless overridden.
    pub fn invocation_key(&self) -> &str {
        &self.invocation_key
    }

    /// `Type#method(ParamType,...)`, unique per signature.
    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param_types(&self) -> Vec<ValueType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    pub fn body_index(&self) -> Option<usize> {
        self.body_index
    }

    pub fn url_index(&self) -> Option<usize> {
        self.url_index
    }

    pub fn query_map_index(&self) -> Option<usize> {
        self.query_map_index
    }

    pub fn header_map_index(&self) -> Option<usize> {
        self.header_map_index
    }

    /// Names of form-bound parameters, in declaration order.
    pub fn form_params(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| match &p.binding {
                ParamBinding::Form(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Declares a method one parameter at a time.
pub struct MethodMetadataBuilder {
    type_name: String,
    method_name: String,
    invocation_key: Option<String>,
    http_method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    params: Vec<Param>,
    return_type: ValueType,
}

impl MethodMetadataBuilder {
    /// HTTP method and path template, e.g. `/users/{id}?expand={expand}`.
    pub fn request(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        self.http_method = method;
        self.path = path.into();
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.request(HttpMethod::Get, path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.request(HttpMethod::Post, path)
    }

    /// A static header; the value may contain `{name}` expressions.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the `{type}.{method}` invocation key.
    pub fn invocation_key(mut self, key: impl Into<String>) -> Self {
        self.invocation_key = Some(key.into());
        self
    }

    /// Adds a parameter whose type comes from `T`.
    pub fn param<T: Wire>(self, binding: ParamBinding) -> Self {
        self.param_typed(binding, T::value_type())
    }

    pub fn param_typed(mut self, binding: ParamBinding, ty: ValueType) -> Self {
        self.params.push(Param { binding, ty, expander: Arc::new(ToStringExpander) });
        self
    }

    /// Replaces the expander of the most recently added parameter.
    pub fn expander(mut self, expander: Arc<dyn Expander>) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.expander = expander;
        }
        self
    }

    pub fn returns<R: Wire>(self) -> Self {
        self.returns_typed(R::value_type())
    }

    pub fn returns_typed(mut self, ty: ValueType) -> Self {
        self.return_type = ty;
        self
    }

    pub fn build(self) -> Result<MethodMetadata, ContractError> {
        let label = format!("{}#{}", self.type_name, self.method_name);
        let mut template = RequestTemplate::new(self.http_method, &self.path);
        for (name, value) in &self.headers {
            template.header(name, [value.as_str()]);
        }

        let mut body_index = None;
        let mut url_index = None;
        let mut query_map_index = None;
        let mut header_map_index = None;
        let mut has_form = false;

        let single = |slot: &mut Option<usize>, idx: usize, kind: &'static str| match slot {
            Some(_) => Err(ContractError::Duplicate { method: label.clone(), kind }),
            None => {
                *slot = Some(idx);
                Ok(())
            }
        };

        for (idx, param) in self.params.iter().enumerate() {
            if param.binding.variable().is_some_and(str::is_empty) {
                return Err(ContractError::EmptyName(label.clone()));
            }
            match &param.binding {
                ParamBinding::None | ParamBinding::Path(_) => {}
                ParamBinding::Query(name) => {
                    if !template.has_query(name) {
                        template.query(name, [format!("{{{name}}}")]);
                    }
                }
                ParamBinding::Header(name) => {
                    if !template.headers().contains(name) {
                        template.header(name, [format!("{{{name}}}")]);
                    }
                }
                ParamBinding::Form(_) => has_form = true,
                ParamBinding::Body => {
                    if body_index.is_some() {
                        return Err(ContractError::MultipleBodies(label.clone()));
                    }
                    body_index = Some(idx);
                }
                ParamBinding::Url => single(&mut url_index, idx, "URI")?,
                ParamBinding::QueryMap { .. } => {
                    if !param.ty.is_keyed() {
                        return Err(ContractError::NotKeyed { method: label.clone(), index: idx, kind: "query map" });
                    }
                    single(&mut query_map_index, idx, "query map")?;
                }
                ParamBinding::HeaderMap => {
                    if !param.ty.is_keyed() {
                        return Err(ContractError::NotKeyed { method: label.clone(), index: idx, kind: "header map" });
                    }
                    single(&mut header_map_index, idx, "header map")?;
                }
            }
        }

        if has_form && body_index.is_some() {
            return Err(ContractError::BodyWithForm(label));
        }

        let params_desc: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        let config_key = format!("{}#{}({})", self.type_name, self.method_name, params_desc.join(","));
        let invocation_key = self
            .invocation_key
            .unwrap_or_else(|| format!("{}.{}", self.type_name, self.method_name));

        Ok(MethodMetadata {
            type_name: self.type_name,
            method_name: self.method_name,
            invocation_key,
            config_key,
            template,
            params: self.params,
            return_type: self.return_type,
            body_index,
            url_index,
            query_map_index,
            header_map_index,
        })
    }
}
