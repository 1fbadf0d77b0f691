//! # Request Template Builders
//!
//! Turns one call's positional arguments into a resolved `RequestTemplate`.
//! A builder is chosen once per method when the proxy is built, from the
//! method's parameter bindings and the target protocol.
//!
//! | Builder     | Chosen when                       | Body                      |
//! |-------------|-----------------------------------|---------------------------|
//! | `Rpc`       | target protocol is `socket`       | every argument, `ArgsBody` |
//! | `Form`      | form parameters, no body          | form fields via encoder   |
//! | `Body`      | one body parameter                | that argument via encoder |
//! | `Resolving` | otherwise                         | none                      |

use std::collections::BTreeMap;
use std::sync::Arc;

use polywire::ArgsBody;
use polywire::Value;
use polywire::ValueType;

use crate::codec::BodyEncoder;
use crate::error::EncodeError;
use crate::metadata::MethodMetadata;
use crate::metadata::ParamBinding;
use crate::protocol::Protocol;
use crate::template::RequestTemplate;
use crate::template::Variables;
use crate::template::encode_query_component;

/// Query parameter carrying the invocation key on RPC transports.
pub const INVOCATION_QUERY: &str = "interface";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    Resolving,
    Form,
    Body,
    Rpc,
}

/// Creates a resolved template for one call.
pub trait TemplateFactory: Send + Sync {
    fn kind(&self) -> BuilderKind;

    fn create(&self, metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError>;
}

/// Picks the builder for a method and target protocol.
pub fn select_builder(
    metadata: &MethodMetadata,
    protocol: Protocol,
    encoder: Arc<dyn BodyEncoder>,
) -> Arc<dyn TemplateFactory> {
    if protocol == Protocol::Socket {
        return Arc::new(RpcArgs);
    }
    if !metadata.form_params().is_empty() && metadata.body_index().is_none() {
        return Arc::new(FormEncoded { encoder });
    }
    if metadata.body_index().is_some() {
        return Arc::new(BodyEncoded { encoder });
    }
    Arc::new(ResolvingArgs)
}

fn check_arity(metadata: &MethodMetadata, args: &[Value]) -> Result<(), EncodeError> {
    let expected = metadata.params().len();
    if args.len() != expected {
        return Err(EncodeError::ArgumentCount { expected, found: args.len() });
    }
    Ok(())
}

/// Template variables from every named binding. Absent arguments are skipped
/// and list arguments expand element-wise.
fn variables(metadata: &MethodMetadata, args: &[Value]) -> Variables {
    let mut vars = Variables::new();
    for (param, arg) in metadata.params().iter().zip(args) {
        let Some(name) = param.binding.variable() else {
            continue;
        };
        if arg.is_null() {
            continue;
        }
        let expanded: Vec<String> = match arg {
            Value::List(items) => items
                .iter()
                .filter(|v| !v.is_null())
                .filter_map(|v| param.expander.expand(v))
                .collect(),
            other => param.expander.expand(other).into_iter().collect(),
        };
        if !expanded.is_empty() {
            vars.entry(name.to_string()).or_default().extend(expanded);
        }
    }
    vars
}

/// String entries of a map-shaped argument. Lists give one entry per element.
fn map_entries(index: usize, arg: &Value) -> Result<Vec<(String, Vec<String>)>, EncodeError> {
    let entries: Vec<(String, &Value)> = match arg {
        Value::Map(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Record(fields) => fields.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Option(Some(inner)) => return map_entries(index, inner),
        other => return Err(EncodeError::NotAMap { index, found: other.kind() }),
    };
    Ok(entries
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let values = match v {
                Value::List(items) => items.iter().filter_map(Value::to_plain_string).collect(),
                single => single.to_plain_string().into_iter().collect(),
            };
            (k, values)
        })
        .collect())
}

/// Shared path for every builder: expand the template, then apply the URI,
/// query map and header map parameters.
fn resolve(metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError> {
    check_arity(metadata, args)?;
    let mut template = metadata.template().resolve(&variables(metadata, args));

    if let Some(idx) = metadata.url_index() {
        let url = args[idx]
            .to_plain_string()
            .ok_or(EncodeError::NullUri(idx))?;
        template.insert_prefix(&url);
    }

    if let Some(idx) = metadata.query_map_index() {
        let encoded = matches!(
            metadata.params()[idx].binding,
            ParamBinding::QueryMap { encoded: true }
        );
        if !args[idx].is_null() {
            for (name, values) in map_entries(idx, &args[idx])? {
                if encoded {
                    template.query(&name, values);
                } else {
                    let values: Vec<String> = values.iter().map(|v| encode_query_component(v)).collect();
                    template.query(&encode_query_component(&name), values);
                }
            }
        }
    }

    if let Some(idx) = metadata.header_map_index() {
        if !args[idx].is_null() {
            for (name, values) in map_entries(idx, &args[idx])? {
                template.header(&name, values);
            }
        }
    }

    Ok(template)
}

/// Expands the URL and headers only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvingArgs;

impl TemplateFactory for ResolvingArgs {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Resolving
    }

    fn create(&self, metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError> {
        resolve(metadata, args)
    }
}

/// Collects form fields into a map and hands it to the body encoder.
pub struct FormEncoded {
    encoder: Arc<dyn BodyEncoder>,
}

impl TemplateFactory for FormEncoded {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Form
    }

    fn create(&self, metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError> {
        let mut template = resolve(metadata, args)?;
        let mut form = BTreeMap::new();
        for (param, arg) in metadata.params().iter().zip(args) {
            if let ParamBinding::Form(name) = &param.binding {
                if !arg.is_null() {
                    form.insert(name.clone(), arg.clone());
                }
            }
        }
        let ty = ValueType::Map(Box::new(ValueType::Any));
        self.encoder.encode(&Value::Map(form), &ty, &mut template)?;
        Ok(template)
    }
}

/// Hands the single body argument to the body encoder.
pub struct BodyEncoded {
    encoder: Arc<dyn BodyEncoder>,
}

impl TemplateFactory for BodyEncoded {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Body
    }

    fn create(&self, metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError> {
        let mut template = resolve(metadata, args)?;
        if let Some(idx) = metadata.body_index() {
            if args[idx].is_null() {
                return Err(EncodeError::NullBody(idx));
            }
            let ty = metadata.params()[idx].ty.clone();
            self.encoder.encode(&args[idx], &ty, &mut template)?;
        }
        Ok(template)
    }
}

/// Serializes every argument into an `ArgsBody` and tags the request with
/// its invocation key.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcArgs;

impl TemplateFactory for RpcArgs {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Rpc
    }

    fn create(&self, metadata: &MethodMetadata, args: &[Value]) -> Result<RequestTemplate, EncodeError> {
        let mut template = resolve(metadata, args)?;
        let body = ArgsBody::from_values(args)?;
        template.set_body(Some(body.into_bytes()));
        if !template.has_query(INVOCATION_QUERY) {
            template.query(INVOCATION_QUERY, [encode_query_component(metadata.invocation_key())]);
        }
        Ok(template)
    }
}
