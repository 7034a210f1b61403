//! Azimuth turns declarative map markup into OpenLayers or Leaflet objects.
//!
//! A page declares layers and maps as elements with attributes. Each element's attributes are
//! collected into an [`AttributeBag`] and handed to a [`MapContext`]:
//!
//! * [`MapContext::build_layer`] normalizes the attributes into options, picks the mapping library
//!   present in the page and builds the layer with that library's [`LayerBackend`]. The layer is
//!   kept in the context's [`LayerRegistry`].
//! * [`MapContext::build_map`] builds a map holding every registered layer that was declared inside
//!   a map element, and returns a [`MapHandle`] that forwards map events to the host element.
//!
//! ```ignore
//! let context = MapContext::builder().with_backend(MapLib::OpenLayers).build();
//!
//! context.build_layer(
//!     &AttributeBag::new()
//!         .with("lyr-type", "tiles")
//!         .with("lyr-url", "http://t${s}.example.com/${z}/${x}/${y}.png"),
//!     true,
//! )?;
//! let map = context.build_map(host, &AttributeBag::new().with("zoom", "4"))?;
//! ```
//!
//! Layers and maps are plain descriptions of the native library objects
//! ([`NativeLayer`], [`NativeMapKind`]), which the page glue instantiates.

pub(crate) mod async_runtime;
pub mod attributes;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod expression;
pub mod fetch;
pub mod layer;
pub mod map;
pub mod projection;
pub mod value;

pub use attributes::{AttributeBag, AttributeNormalizer, LayerOptions};
pub use backend::{Environment, LayerBackend, MapLib};
pub use config::Defaults;
pub use context::{MapContext, MapContextBuilder};
pub use error::{AzimuthError, Result};
pub use expression::{DefaultEvaluator, ExpressionEvaluator, Resolution, Scope};
pub use fetch::{DataFetcher, FetchError, FetchRequest, HttpFetcher};
pub use layer::{DataState, LayerHandle, LayerKind, LayerRegistry, NativeLayer, RegistryEvent};
pub use map::{
    EventBinding, HostElement, MapEvent, MapHandle, MapOptions, NativeEvent, NativeMap,
    NativeMapKind, NotificationScheduler, QueueScheduler, TokioScheduler,
};
pub use value::{Callback, OptionMap, OptionValue};

#[cfg(test)]
pub(crate) mod tests {
    use geojson::GeoJson;
    use parking_lot::Mutex;

    use crate::fetch::{DataFetcher, FetchError, FetchRequest};
    use crate::map::{HostElement, MapEvent};

    /// Fetcher failing every request.
    pub(crate) struct NoFetch;

    #[async_trait::async_trait]
    impl DataFetcher for NoFetch {
        async fn fetch_geojson(&self, request: &FetchRequest) -> Result<GeoJson, FetchError> {
            Err(FetchError::Network {
                url: request.url.clone(),
                message: "offline".into(),
            })
        }
    }

    /// Fetcher answering every request with the same result.
    pub(crate) struct StaticFetch(pub(crate) Result<GeoJson, FetchError>);

    #[async_trait::async_trait]
    impl DataFetcher for StaticFetch {
        async fn fetch_geojson(&self, _request: &FetchRequest) -> Result<GeoJson, FetchError> {
            self.0.clone()
        }
    }

    pub(crate) struct RecordingHost {
        id: String,
        triggered: Mutex<Vec<MapEvent>>,
    }

    impl RecordingHost {
        pub(crate) fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                triggered: Mutex::new(vec![]),
            }
        }

        pub(crate) fn triggered(&self) -> Vec<MapEvent> {
            self.triggered.lock().clone()
        }
    }

    impl HostElement for RecordingHost {
        fn id(&self) -> &str {
            &self.id
        }

        fn trigger(&self, event: &MapEvent) {
            self.triggered.lock().push(event.clone());
        }
    }
}
