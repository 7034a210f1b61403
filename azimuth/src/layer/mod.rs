//! Layers constructed by the backends and the registry that keeps them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use crate::backend::leaflet::LeafletLayer;
use crate::backend::openlayers::OlLayer;
use crate::backend::MapLib;

mod registry;

pub use registry::{LayerRegistry, RegistryEvent};

/// Category of map content with its own option schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// XYZ tile layer.
    Tiles,
    /// OGC Web Map Service layer.
    Wms,
    /// Vector layer fed with GeoJSON.
    GeoJson,
    /// Single point marker.
    Marker,
}

impl LayerKind {
    /// Reads a kind as written in markup. Matching is case-insensitive.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "tiles" | "tile" | "xyz" => Some(Self::Tiles),
            "wms" => Some(Self::Wms),
            "geojson" | "vector" => Some(Self::GeoJson),
            "marker" | "markers" => Some(Self::Marker),
            _ => None,
        }
    }

    /// Canonical markup name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiles => "tiles",
            Self::Wms => "wms",
            Self::GeoJson => "geojson",
            Self::Marker => "marker",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-native layer object.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeLayer {
    /// Layer for OpenLayers.
    OpenLayers(OlLayer),
    /// Layer for Leaflet.
    Leaflet(LeafletLayer),
}

/// Loading state of layer content that arrives asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum DataState {
    /// Content is still being fetched.
    Pending,
    /// Content is available (or the layer loads it itself).
    Ready,
    /// Fetching content failed.
    Failed(String),
}

/// Unique identifier of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct LayerInner {
    id: LayerId,
    name: Option<String>,
    kind: LayerKind,
    backend: MapLib,
    map_layer: bool,
    native: RwLock<NativeLayer>,
    data: watch::Sender<DataState>,
}

/// Shared reference to a constructed layer.
///
/// Clones refer to the same layer. Handles compare equal when they refer to the same layer.
#[derive(Clone)]
pub struct LayerHandle(Arc<LayerInner>);

impl LayerHandle {
    pub(crate) fn new(
        name: Option<String>,
        kind: LayerKind,
        backend: MapLib,
        map_layer: bool,
        native: NativeLayer,
        state: DataState,
    ) -> Self {
        let (data, _) = watch::channel(state);
        Self(Arc::new(LayerInner {
            id: LayerId::next(),
            name,
            kind,
            backend,
            map_layer,
            native: RwLock::new(native),
            data,
        }))
    }

    /// Identifier of the layer.
    pub fn id(&self) -> LayerId {
        self.0.id
    }

    /// Name given in markup.
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Kind of the layer.
    pub fn kind(&self) -> LayerKind {
        self.0.kind
    }

    /// Backend the layer was built for.
    pub fn backend(&self) -> MapLib {
        self.0.backend
    }

    /// Whether the layer was declared inside a map element.
    pub fn is_map_layer(&self) -> bool {
        self.0.map_layer
    }

    /// Native layer object.
    pub fn native(&self) -> RwLockReadGuard<'_, NativeLayer> {
        self.0.native.read()
    }

    /// Mutable native layer object, for the rendering engine and for content arriving later.
    pub fn native_mut(&self) -> RwLockWriteGuard<'_, NativeLayer> {
        self.0.native.write()
    }

    /// Current loading state.
    pub fn data_state(&self) -> DataState {
        self.0.data.borrow().clone()
    }

    /// Waits until the layer content is no longer pending and returns the final state.
    pub async fn data_ready(&self) -> DataState {
        let mut receiver = self.0.data.subscribe();
        receiver
            .wait_for(|state| !matches!(state, DataState::Pending))
            .await
            .map(|state| state.clone())
            .unwrap_or_else(|_| self.data_state())
    }

    pub(crate) fn set_data_state(&self, state: DataState) {
        self.0.data.send_replace(state);
    }
}

impl PartialEq for LayerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for LayerHandle {}

impl fmt::Debug for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .field("backend", &self.0.backend)
            .field("map_layer", &self.0.map_layer)
            .finish()
    }
}
