//! Plug contract.
//!
//! A plug is one stage of a pipeline. It receives the request by value and
//! returns the updated request; stopping the pipeline is a value on the
//! request (`halt`), not control flow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Request;

/// Per-entry options handed to a plug on every call.
#[derive(Debug, Clone, Default)]
pub struct PlugOptions {
    /// Deadline for any I/O the plug performs
    pub deadline: Option<Duration>,
    pub values: HashMap<String, Value>,
}

impl PlugOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[async_trait]
pub trait Plug: Send + Sync {
    /// Stable name used in error records and traces
    fn name(&self) -> &str;

    async fn call(&self, request: Request, opts: &PlugOptions) -> Request;
}

/// A plug together with the options it runs with.
#[derive(Clone)]
pub struct PlugEntry {
    pub plug: Arc<dyn Plug>,
    pub options: PlugOptions,
}

impl PlugEntry {
    pub fn new(plug: impl Plug + 'static) -> Self {
        Self::from_arc(Arc::new(plug))
    }

    pub fn from_arc(plug: Arc<dyn Plug>) -> Self {
        Self {
            plug,
            options: PlugOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlugOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        self.plug.name()
    }
}

impl std::fmt::Debug for PlugEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlugEntry")
            .field("plug", &self.plug.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Named synchronous plug built from a closure.
///
/// ```rust,ignore
/// let tag = FnPlug::new("tag", |req, _opts| req.put_assign("tenant", json!("acme")));
/// ```
pub struct FnPlug<F> {
    name: String,
    f: F,
}

impl<F> FnPlug<F>
where
    F: Fn(Request, &PlugOptions) -> Request + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Plug for FnPlug<F>
where
    F: Fn(Request, &PlugOptions) -> Request + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: Request, opts: &PlugOptions) -> Request {
        (self.f)(request, opts)
    }
}
