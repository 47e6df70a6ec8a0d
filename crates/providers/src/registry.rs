//! API provider registry: routes a model call to the adapter for its API.
//!
//! Every [`Model`] names the wire protocol it speaks ([`Api`]). Adapters are
//! registered under the API they implement, optionally tagged with a source
//! id so an extension can later remove everything it registered.
//!
//! The process-wide registry is a lazily initialised `RwLock<ApiRegistry>`
//! seeded with the built-in adapters. Dispatch takes the read lock only long
//! enough to clone an `Arc` handle; the lock is never held across `.await`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use switchyard_core::error::ProviderError;
use switchyard_core::message::AssistantMessage;
use switchyard_core::model::{Api, Model};
use switchyard_core::provider::{AssistantMessageEventStream, Context, SimpleStreamOptions, StreamOptions};
use tracing::{debug, info};

use crate::anthropic::AnthropicAdapter;
use crate::openai_compat::OpenAiCompatAdapter;

/// A vendor adapter: turns a [`Context`] into a streamed assistant message.
///
/// Both methods return immediately. Transport failures are reported as a
/// terminal `error` event on the returned stream, never as a panic or a
/// missing terminal event.
///
/// The built-in adapters spawn the HTTP request onto the current Tokio
/// runtime, so calling them (directly or through [`stream`] and friends)
/// outside a runtime panics.
pub trait ApiAdapter: Send + Sync {
    /// The API this adapter speaks.
    fn api(&self) -> Api;

    /// Stream with full, vendor-neutral options.
    fn stream(&self, model: &Model, context: &Context, options: StreamOptions) -> AssistantMessageEventStream;

    /// Stream with the simplified options (adds a reasoning level).
    fn stream_simple(
        &self,
        model: &Model,
        context: &Context,
        options: SimpleStreamOptions,
    ) -> AssistantMessageEventStream;
}

/// A registered adapter together with the API it was registered under.
#[derive(Clone)]
pub struct ApiProvider {
    api: Api,
    adapter: Arc<dyn ApiAdapter>,
    source: Option<String>,
}

impl std::fmt::Debug for ApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiProvider")
            .field("api", &self.api)
            .field("source", &self.source)
            .finish()
    }
}

impl ApiProvider {
    pub fn new(adapter: Arc<dyn ApiAdapter>, source: Option<String>) -> Self {
        Self {
            api: adapter.api(),
            adapter,
            source,
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn check(&self, model: &Model) -> Result<(), ProviderError> {
        if model.api != self.api {
            return Err(ProviderError::ApiMismatch {
                registered: self.api.to_string(),
                requested: model.api.to_string(),
            });
        }
        Ok(())
    }

    /// Stream a response. Fails before any I/O if `model.api` differs from
    /// the API this adapter was registered under.
    pub fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: StreamOptions,
    ) -> Result<AssistantMessageEventStream, ProviderError> {
        self.check(model)?;
        Ok(self.adapter.stream(model, context, options))
    }

    pub fn stream_simple(
        &self,
        model: &Model,
        context: &Context,
        options: SimpleStreamOptions,
    ) -> Result<AssistantMessageEventStream, ProviderError> {
        self.check(model)?;
        Ok(self.adapter.stream_simple(model, context, options))
    }
}

/// A mapping from API to adapter.
///
/// Usable on its own for isolated setups; the process-wide instance sits
/// behind the free functions in this module.
#[derive(Debug, Default, Clone)]
pub struct ApiRegistry {
    providers: HashMap<Api, ApiProvider>,
    /// Registration order, for stable listing
    order: Vec<Api>,
}

impl ApiRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in adapters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicAdapter::new()), None);
        registry.register(Arc::new(OpenAiCompatAdapter::new()), None);
        registry
    }

    /// Register an adapter under its API, replacing any previous entry.
    pub fn register(&mut self, adapter: Arc<dyn ApiAdapter>, source: Option<String>) {
        let provider = ApiProvider::new(adapter, source);
        let api = provider.api.clone();
        if self.providers.insert(api.clone(), provider).is_none() {
            self.order.push(api);
        }
    }

    pub fn get(&self, api: &Api) -> Option<ApiProvider> {
        self.providers.get(api).cloned()
    }

    /// All registered providers, in registration order.
    pub fn list(&self) -> Vec<ApiProvider> {
        self.order.iter().filter_map(|api| self.providers.get(api).cloned()).collect()
    }

    /// Remove every adapter registered with `source`. Returns how many were removed.
    pub fn unregister_source(&mut self, source: &str) -> usize {
        let before = self.providers.len();
        self.providers.retain(|_, p| p.source() != Some(source));
        let providers = &self.providers;
        self.order.retain(|api| providers.contains_key(api));
        before - self.providers.len()
    }

    pub fn clear(&mut self) {
        self.providers.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

static REGISTRY: LazyLock<RwLock<ApiRegistry>> = LazyLock::new(|| RwLock::new(ApiRegistry::with_builtins()));

fn read() -> RwLockReadGuard<'static, ApiRegistry> {
    REGISTRY.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write() -> RwLockWriteGuard<'static, ApiRegistry> {
    REGISTRY.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Register an adapter process-wide. `source` tags it for bulk removal.
pub fn register_api_provider(adapter: Arc<dyn ApiAdapter>, source: Option<&str>) {
    let api = adapter.api();
    write().register(adapter, source.map(str::to_string));
    info!(api = %api, source = source.unwrap_or("builtin"), "Registered API provider");
}

/// Look up the adapter for `api`. `None` means nothing is registered.
pub fn get_api_provider(api: &Api) -> Option<ApiProvider> {
    read().get(api)
}

pub fn get_api_providers() -> Vec<ApiProvider> {
    read().list()
}

/// Remove every adapter registered with `source`.
pub fn unregister_api_providers(source: &str) -> usize {
    let removed = write().unregister_source(source);
    debug!(source, removed, "Unregistered API providers");
    removed
}

pub fn clear_api_providers() {
    write().clear();
    debug!("Cleared all API providers");
}

/// Restore the built-in baseline.
pub fn reset_api_providers() {
    *write() = ApiRegistry::with_builtins();
    debug!("Reset API providers to built-ins");
}

fn resolve(model: &Model) -> Result<ApiProvider, ProviderError> {
    get_api_provider(&model.api).ok_or_else(|| ProviderError::ApiNotRegistered(model.api.to_string()))
}

/// Dispatch to the adapter registered for `model.api`.
pub fn stream(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> Result<AssistantMessageEventStream, ProviderError> {
    debug!(api = %model.api, provider = %model.provider, model = %model.id, "Dispatching stream");
    resolve(model)?.stream(model, context, options)
}

pub fn stream_simple(
    model: &Model,
    context: &Context,
    options: SimpleStreamOptions,
) -> Result<AssistantMessageEventStream, ProviderError> {
    debug!(api = %model.api, provider = %model.provider, model = %model.id, "Dispatching simple stream");
    resolve(model)?.stream_simple(model, context, options)
}

/// Stream and wait for the final message.
pub async fn complete(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> Result<AssistantMessage, ProviderError> {
    let stream = stream(model, context, options)?;
    final_message(stream).await
}

pub async fn complete_simple(
    model: &Model,
    context: &Context,
    options: SimpleStreamOptions,
) -> Result<AssistantMessage, ProviderError> {
    let stream = stream_simple(model, context, options)?;
    final_message(stream).await
}

async fn final_message(stream: AssistantMessageEventStream) -> Result<AssistantMessage, ProviderError> {
    stream
        .result()
        .await
        .ok_or_else(|| ProviderError::StreamInterrupted("stream closed without a final message".into()))
}
