use std::collections::VecDeque;

use parking_lot::Mutex;

use super::LayerHandle;
use crate::events::{Event, EventChannel, Subscription};

/// Lifecycle event published by the [`LayerRegistry`].
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A layer was created and announced.
    LayerNew(LayerHandle),
    /// Asynchronously fetched content of a layer arrived.
    LayerData(LayerHandle),
    /// Fetching content of a layer failed.
    LayerError {
        /// Affected layer.
        layer: LayerHandle,
        /// Failure description.
        message: String,
    },
}

impl RegistryEvent {
    /// Name of [`RegistryEvent::LayerNew`].
    pub const NEW: &'static str = "layers:new";
    /// Name of [`RegistryEvent::LayerData`].
    pub const DATA: &'static str = "layers:data";
    /// Name of [`RegistryEvent::LayerError`].
    pub const ERROR: &'static str = "layers:error";

    /// Layer the event is about.
    pub fn layer(&self) -> &LayerHandle {
        match self {
            Self::LayerNew(layer) | Self::LayerData(layer) => layer,
            Self::LayerError { layer, .. } => layer,
        }
    }
}

impl Event for RegistryEvent {
    fn name(&self) -> &str {
        match self {
            Self::LayerNew(_) => Self::NEW,
            Self::LayerData(_) => Self::DATA,
            Self::LayerError { .. } => Self::ERROR,
        }
    }
}

/// Ordered store of constructed layers.
///
/// Position in the registry is the stacking order handed to the map. Builders decide whether a
/// layer goes to the tail ([`append`](Self::append)) or the head ([`prepend`](Self::prepend)).
#[derive(Default)]
pub struct LayerRegistry {
    layers: Mutex<VecDeque<LayerHandle>>,
    events: EventChannel<RegistryEvent>,
}

impl LayerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer at the tail.
    pub fn append(&self, layer: LayerHandle) {
        log::debug!("Appending layer {:?}", layer.id());
        self.layers.lock().push_back(layer);
    }

    /// Adds a layer at the head.
    pub fn prepend(&self, layer: LayerHandle) {
        log::debug!("Prepending layer {:?}", layer.id());
        self.layers.lock().push_front(layer);
    }

    /// All layers in registry order.
    pub fn layers(&self) -> Vec<LayerHandle> {
        self.layers.lock().iter().cloned().collect()
    }

    /// Layers declared inside a map element, in registry order.
    pub fn layers_in_map(&self) -> Vec<LayerHandle> {
        self.layers
            .lock()
            .iter()
            .filter(|layer| layer.is_map_layer())
            .cloned()
            .collect()
    }

    /// Whether the layer is registered.
    pub fn contains(&self, layer: &LayerHandle) -> bool {
        self.layers.lock().contains(layer)
    }

    /// Number of registered layers.
    pub fn len(&self) -> usize {
        self.layers.lock().len()
    }

    /// Whether no layer is registered.
    pub fn is_empty(&self) -> bool {
        self.layers.lock().is_empty()
    }

    /// Removes every layer and every event subscription.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.layers.lock());
        self.events.clear();
        log::debug!("Layer registry cleared, {} layers removed", removed.len());
    }

    /// Subscribes to registry events called `name`, see the constants on [`RegistryEvent`].
    pub fn on(
        &self,
        name: &str,
        listener: impl Fn(&RegistryEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.on(name, listener)
    }

    /// Subscribes to the next registry event called `name`.
    pub fn once(
        &self,
        name: &str,
        listener: impl Fn(&RegistryEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.once(name, listener)
    }

    /// Publishes an event to the subscribers. Returns the number of subscribers invoked.
    pub fn emit(&self, event: &RegistryEvent) -> usize {
        self.events.emit(event)
    }
}
