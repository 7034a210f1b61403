//! Entry point tying configuration, expression evaluation and the backends together.

use std::sync::Arc;

use crate::attributes::{AttributeBag, AttributeNormalizer, LayerOptions, LAYER_RESERVED};
use crate::backend::{BuildContext, Environment, LayerRequest, MapLib};
use crate::config::Defaults;
use crate::error::{AzimuthError, Result};
use crate::expression::{DefaultEvaluator, ExpressionEvaluator, Scope};
use crate::fetch::{DataFetcher, HttpFetcher};
use crate::layer::{LayerHandle, LayerKind, LayerRegistry};
use crate::map::{
    parse_events, EventBridge, HostElement, MapBuilder, MapHandle, MapOptions,
    NotificationScheduler, TokioScheduler,
};

/// Builds layers and maps from element attributes.
///
/// Layers built through one context share its [`LayerRegistry`]. A map picks up the in-map layers
/// registered at the time it is built, and destroying the map clears the registry.
pub struct MapContext {
    defaults: Arc<Defaults>,
    environment: Environment,
    registry: Arc<LayerRegistry>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    scope: Arc<Scope>,
    fetcher: Arc<dyn DataFetcher>,
    scheduler: Arc<dyn NotificationScheduler>,
}

impl MapContext {
    /// Starts configuring a context.
    pub fn builder() -> MapContextBuilder {
        MapContextBuilder::default()
    }

    /// Configuration defaults.
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Libraries present in the page.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Layer registry shared by all builds of this context.
    pub fn registry(&self) -> &Arc<LayerRegistry> {
        &self.registry
    }

    /// Variables visible to attribute expressions.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            defaults: &self.defaults,
            registry: &self.registry,
            fetcher: &self.fetcher,
        }
    }

    fn normalizer(&self) -> AttributeNormalizer<'_> {
        AttributeNormalizer::new(self.evaluator.as_ref(), &self.scope)
    }

    /// Builds a layer from the attributes of a layer element and registers it.
    ///
    /// `is_in_map` tells whether the element is nested in a map element.
    pub fn build_layer(&self, attributes: &AttributeBag, is_in_map: bool) -> Result<LayerHandle> {
        let options = self.normalizer().normalize(attributes, LAYER_RESERVED);
        let lib = self.environment.select_backend(&options)?;

        let raw_kind = attributes.kind().unwrap_or_default();
        let kind = LayerKind::parse(raw_kind).ok_or_else(|| AzimuthError::UnsupportedLayerKind {
            kind: raw_kind.to_string(),
            backend: lib,
        })?;

        let request = LayerRequest {
            name: attributes.name().map(String::from),
            url: attributes.url().map(String::from),
            options,
            is_in_map,
        };
        lib.backend().build(kind, &self.build_context(), request)
    }

    /// Builds the map of a map element mounted on `host`, wiring the element's event bindings.
    pub fn build_map(
        &self,
        host: Arc<dyn HostElement>,
        attributes: &AttributeBag,
    ) -> Result<MapHandle> {
        let normalizer = self.normalizer();
        let mut selection = LayerOptions::new();
        if let Some(raw) = attributes.get("maplib") {
            selection.insert("maplib".into(), normalizer.resolve(raw).into_value());
        }
        let lib = self.environment.select_backend(&selection)?;

        let options = MapOptions::from_attributes(attributes, &self.defaults, &normalizer, lib)?;
        let map = MapBuilder::new(lib).construct(&self.build_context(), &options)?;

        let handle = MapHandle::new(
            map,
            EventBridge::new(host, self.scheduler.clone()),
            self.registry.clone(),
        );
        let bindings = parse_events(attributes);
        handle.bind_events(&bindings, self.evaluator.clone(), self.scope.clone());

        log::debug!(
            "Map on {} bound {} event handlers",
            handle.host().id(),
            bindings.len()
        );
        Ok(handle)
    }
}

/// Builder for [`MapContext`].
pub struct MapContextBuilder {
    defaults: Defaults,
    environment: Environment,
    evaluator: Arc<dyn ExpressionEvaluator>,
    scope: Scope,
    fetcher: Option<Arc<dyn DataFetcher>>,
    scheduler: Arc<dyn NotificationScheduler>,
}

impl Default for MapContextBuilder {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            environment: Environment::new(),
            evaluator: Arc::new(DefaultEvaluator),
            scope: Scope::new(),
            fetcher: None,
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

impl MapContextBuilder {
    /// Sets configuration defaults.
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the environment used to detect libraries.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Marks a library as loaded.
    pub fn with_backend(mut self, lib: MapLib) -> Self {
        self.environment = self.environment.with_backend(lib);
        self
    }

    /// Sets the expression evaluator.
    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Sets the scope attribute expressions are evaluated in.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the fetcher for remote layer data. Defaults to [`HttpFetcher`].
    pub fn with_fetcher(mut self, fetcher: impl DataFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Sets the scheduler of host notifications. Defaults to [`TokioScheduler`].
    pub fn with_scheduler(mut self, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Creates the context with an empty registry.
    pub fn build(self) -> MapContext {
        MapContext {
            defaults: Arc::new(self.defaults),
            environment: self.environment,
            registry: Arc::new(LayerRegistry::new()),
            evaluator: self.evaluator,
            scope: Arc::new(self.scope),
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(HttpFetcher::default()) as Arc<dyn DataFetcher>),
            scheduler: self.scheduler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::openlayers::OlLayer;
    use crate::layer::NativeLayer;
    use crate::tests::{NoFetch, RecordingHost};
    use crate::value::OptionValue;

    fn context(lib: MapLib) -> MapContext {
        MapContext::builder()
            .with_backend(lib)
            .with_fetcher(NoFetch)
            .build()
    }

    #[test]
    fn layer_kind_is_required() {
        let ctx = context(MapLib::OpenLayers);
        let result = ctx.build_layer(&AttributeBag::new().with("lyr-url", "http://a"), true);
        assert!(matches!(
            result,
            Err(AzimuthError::UnsupportedLayerKind { ref kind, .. }) if kind.is_empty()
        ));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn missing_backend_fails_before_registering() {
        let ctx = MapContext::builder().with_fetcher(NoFetch).build();
        let result = ctx.build_layer(&AttributeBag::new().with("lyr-type", "tiles"), true);
        assert!(matches!(result, Err(AzimuthError::MissingBackend)));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn explicit_options_reach_the_builder() {
        let ctx = context(MapLib::OpenLayers);
        let layer = ctx
            .build_layer(
                &AttributeBag::new()
                    .with("lyr-type", "wms")
                    .with("lyr-url", "http://example.com/wms")
                    .with("layers", "roads")
                    .with("lyr-options", "{layers: 'rivers', opacity: 0.3}"),
                false,
            )
            .unwrap();

        match &*layer.native() {
            NativeLayer::OpenLayers(OlLayer::Wms(wms)) => {
                assert_eq!(wms.params["layers"], OptionValue::from("rivers"));
                assert_eq!(wms.options["opacity"], OptionValue::Number(0.3));
            }
            other => panic!("unexpected layer {other:?}"),
        }
        assert!(!layer.is_map_layer());
    }

    #[test]
    fn map_binds_event_attributes() {
        let ctx = context(MapLib::OpenLayers);
        let map = ctx
            .build_map(
                Arc::new(RecordingHost::new("main")),
                &AttributeBag::new()
                    .with("map-click", "handled")
                    .with("zoom", "7"),
            )
            .unwrap();

        assert_eq!(map.native().listener_count("click"), 1);
        assert_eq!(map.backend(), MapLib::OpenLayers);
    }
}
