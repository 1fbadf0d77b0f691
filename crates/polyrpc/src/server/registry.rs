//! # Method Registry
//!
//! Maps `{class}.{method}` invocation keys to handlers, one table per
//! protocol. Built once at startup and read-only afterwards.
//!
//! ## Invariants
//! - A key appears at most once per protocol table.
//! - A controller method is registered under every protocol it exposes:
//!   its own override if it has one, otherwise the controller's list.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use polywire::Value;
use polywire::ValueType;
use tracing::info;
use tracing::warn;

use crate::error::RegistryError;
use crate::protocol::Protocol;
use crate::server::handler::Handler;
use crate::server::handler::InvokeError;

type ErasedInvoker = Arc<dyn Fn(Vec<Value>) -> Result<Value, InvokeError> + Send + Sync>;

/// One invocable method of a registered controller.
#[derive(Clone)]
pub struct MethodHandlerDescriptor {
    pub class_name: String,
    pub method_name: String,
    pub param_types: Vec<ValueType>,
    pub return_type: ValueType,
    pub protocols: Vec<Protocol>,
    invoker: ErasedInvoker,
}

impl MethodHandlerDescriptor {
    /// `{class}.{method}`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    /// Calls the handler on the calling thread.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, InvokeError> {
        (self.invoker)(args)
    }
}

impl fmt::Debug for MethodHandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandlerDescriptor")
            .field("class_name", &self.class_name)
            .field("method_name", &self.method_name)
            .field("param_types", &self.param_types)
            .field("return_type", &self.return_type)
            .field("protocols", &self.protocols)
            .finish_non_exhaustive()
    }
}

/// Something that exposes methods for remote invocation.
pub trait RpcController: Send + Sync {
    fn class_name(&self) -> &str;

    fn descriptors(&self) -> Vec<MethodHandlerDescriptor>;
}

struct RegisteredMethod {
    name: String,
    protocols: Option<Vec<Protocol>>,
    param_types: Vec<ValueType>,
    return_type: ValueType,
    invoker: ErasedInvoker,
}

/// A controller instance and its exposed methods.
pub struct Controller<T> {
    class_name: String,
    instance: Arc<T>,
    protocols: Vec<Protocol>,
    methods: Vec<RegisteredMethod>,
}

impl<T: Send + Sync + 'static> Controller<T> {
    pub fn new(class_name: impl Into<String>, instance: T) -> Self {
        Self::from_arc(class_name, Arc::new(instance))
    }

    pub fn from_arc(class_name: impl Into<String>, instance: Arc<T>) -> Self {
        Self {
            class_name: class_name.into(),
            instance,
            protocols: vec![Protocol::Socket],
            methods: Vec::new(),
        }
    }

    /// Protocols every method is exposed on unless it overrides them.
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.protocols = protocols.into_iter().collect();
        self
    }

    pub fn method<Args, H>(self, name: impl Into<String>, handler: H) -> Self
    where
        Args: 'static,
        H: Handler<T, Args>,
    {
        self.register(name.into(), None, handler)
    }

    /// Exposes a method on its own set of protocols.
    pub fn method_with_protocols<Args, H>(
        self,
        name: impl Into<String>,
        protocols: impl IntoIterator<Item = Protocol>,
        handler: H,
    ) -> Self
    where
        Args: 'static,
        H: Handler<T, Args>,
    {
        self.register(name.into(), Some(protocols.into_iter().collect()), handler)
    }

    fn register<Args, H>(mut self, name: String, protocols: Option<Vec<Protocol>>, handler: H) -> Self
    where
        Args: 'static,
        H: Handler<T, Args>,
    {
        let instance = self.instance.clone();
        let invoker: ErasedInvoker = Arc::new(move |args: Vec<Value>| handler.call(&instance, args));
        self.methods.push(RegisteredMethod {
            name,
            protocols,
            param_types: H::param_types(),
            return_type: H::return_type(),
            invoker,
        });
        self
    }
}

impl<T: Send + Sync + 'static> RpcController for Controller<T> {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn descriptors(&self) -> Vec<MethodHandlerDescriptor> {
        self.methods
            .iter()
            .map(|m| MethodHandlerDescriptor {
                class_name: self.class_name.clone(),
                method_name: m.name.clone(),
                param_types: m.param_types.clone(),
                return_type: m.return_type.clone(),
                protocols: m.protocols.clone().unwrap_or_else(|| self.protocols.clone()),
                invoker: m.invoker.clone(),
            })
            .collect()
    }
}

/// The method table of one protocol.
#[derive(Debug, Clone)]
pub struct RpcServerContext {
    protocol: Protocol,
    methods: HashMap<String, MethodHandlerDescriptor>,
}

impl RpcServerContext {
    pub fn empty(protocol: Protocol) -> Self {
        Self { protocol, methods: HashMap::new() }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn get(&self, key: &str) -> Option<&MethodHandlerDescriptor> {
        self.methods.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Every protocol's method table.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    contexts: BTreeMap<Protocol, Arc<RpcServerContext>>,
}

impl MethodRegistry {
    pub fn build(controllers: &[Box<dyn RpcController>]) -> Result<Self, RegistryError> {
        let mut tables: BTreeMap<Protocol, HashMap<String, MethodHandlerDescriptor>> = BTreeMap::new();

        for controller in controllers {
            for descriptor in controller.descriptors() {
                let key = descriptor.key();
                for &protocol in &descriptor.protocols {
                    let table = tables.entry(protocol).or_default();
                    if table.contains_key(&key) {
                        return Err(RegistryError::DuplicateMethod { protocol, key });
                    }
                    info!(
                        %protocol,
                        key = %key,
                        params = ?descriptor.param_types,
                        returns = %descriptor.return_type,
                        "Mapped RPC service"
                    );
                    table.insert(key.clone(), descriptor.clone());
                }
            }
        }

        if tables.is_empty() {
            warn!("no rpc controllers registered, method registry is empty");
        }

        let contexts = tables
            .into_iter()
            .map(|(protocol, methods)| (protocol, Arc::new(RpcServerContext { protocol, methods })))
            .collect();
        Ok(Self { contexts })
    }

    /// The table for `protocol`, if any method is exposed on it.
    pub fn context(&self, protocol: Protocol) -> Option<Arc<RpcServerContext>> {
        self.contexts.get(&protocol).cloned()
    }

    pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.contexts.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
