//! Request pipeline.
//!
//! - plug.rs: the `Plug` trait, per-entry options and closure plugs
//! - runner.rs: ordered execution with halt and crash handling

pub mod plug;
pub mod runner;

use std::sync::Arc;

pub use plug::{FnPlug, Plug, PlugEntry, PlugOptions};
pub use runner::{TRACE_KEY, run};

use crate::types::Request;

/// An ordered list of plugs.
///
/// ```rust,ignore
/// let pipeline = Pipeline::new()
///     .plug(ValidateInput::new())
///     .plug(ResolveConfig::new(config))
///     .plug_with(CallUpstream::new(transport, registry), PlugOptions::new().with_deadline(secs(30)));
/// let request = pipeline.run(request).await?;
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    entries: Vec<PlugEntry>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(self, plug: impl Plug + 'static) -> Self {
        self.plug_with(plug, PlugOptions::default())
    }

    pub fn plug_with(mut self, plug: impl Plug + 'static, options: PlugOptions) -> Self {
        self.entries.push(PlugEntry::new(plug).with_options(options));
        self
    }

    pub fn plug_arc(mut self, plug: Arc<dyn Plug>, options: PlugOptions) -> Self {
        self.entries
            .push(PlugEntry::from_arc(plug).with_options(options));
        self
    }

    pub fn entries(&self) -> &[PlugEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// See [`run`].
    #[allow(clippy::result_large_err)]
    pub async fn run(&self, request: Request) -> Result<Request, Request> {
        run(request, &self.entries).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.name()))
            .finish()
    }
}
