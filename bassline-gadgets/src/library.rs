use crate::shims::{Passthrough, RateLimit, Tap, TapLog};
use bassline_core::error::GadgetError;
use bassline_core::gadget::Gadget;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds gadget instances from node params.
pub trait GadgetFactory: Send + Sync {
    /// Create one instance.
    fn create(&self, params: &Value) -> Result<Arc<dyn Gadget>, GadgetError>;
}

impl<F> GadgetFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Gadget>, GadgetError> + Send + Sync,
{
    fn create(&self, params: &Value) -> Result<Arc<dyn Gadget>, GadgetError> {
        self(params)
    }
}

/// Name → factory. Gadget templates and aspect shims resolve here.
#[derive(Clone, Default)]
pub struct GadgetLibrary {
    factories: HashMap<String, Arc<dyn GadgetFactory>>,
    taps: TapLog,
}

impl GadgetLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding the shims for the built-in aspects: `tap`,
    /// `rate-limit` and `passthrough`.
    pub fn with_builtin_shims() -> Self {
        let mut library = Self::new();
        let taps = library.taps.clone();
        library.register("tap", move |_: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
            Ok(Arc::new(Tap::new(taps.clone())))
        });
        library.register("rate-limit", |params: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
            Ok(Arc::new(RateLimit::from_params(params)?))
        });
        library.register("passthrough", |_: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
            Ok(Arc::new(Passthrough::new()))
        });
        library
    }

    /// Register a factory, replacing any previous one with that name.
    pub fn register(&mut self, name: impl Into<String>, factory: impl GadgetFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a template whose instances all share one gadget.
    pub fn register_shared(&mut self, name: impl Into<String>, gadget: Arc<dyn Gadget>) {
        self.register(name, move |_: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
            Ok(gadget.clone())
        });
    }

    /// Whether a template is known.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate a template.
    pub fn create(&self, name: &str, params: &Value) -> Result<Arc<dyn Gadget>, GadgetError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GadgetError::UnknownTemplate(name.to_owned()))?;
        factory.create(params)
    }

    /// Records written by every `tap` shim this library created.
    pub fn tap_log(&self) -> &TapLog {
        &self.taps
    }
}

impl std::fmt::Debug for GadgetLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("GadgetLibrary").field("templates", &names).finish()
    }
}
