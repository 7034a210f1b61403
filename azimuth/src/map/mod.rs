//! Map construction and the handle callers keep for the map's lifetime.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use regex::Regex;

use crate::attributes::{AttributeBag, AttributeNormalizer};
use crate::backend::leaflet::LeafletMap;
use crate::backend::openlayers::OlMap;
use crate::backend::{BuildContext, MapLib};
use crate::config::Defaults;
use crate::error::{AzimuthError, Result};
use crate::events::{Event, EventChannel, Subscription};
use crate::expression::{ExpressionEvaluator, Resolution, Scope};
use crate::layer::{LayerHandle, LayerRegistry};
use crate::projection::Projection;
use crate::value::{OptionMap, OptionValue};

mod bridge;

pub use bridge::{EventBridge, HostElement, NotificationScheduler, QueueScheduler, TokioScheduler};

/// Attributes of a map element that configure the map itself.
pub const MAP_ATTRIBUTES: &[&str] = &[
    "center",
    "zoom",
    "projection",
    "proj",
    "crs",
    "dispProjection",
    "dispProj",
    "controls",
    "controlOpts",
    "maplib",
];

/// Map configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    /// Center as `[longitude, latitude]` in EPSG:4326.
    pub center: [f64; 2],
    /// Zoom level.
    pub zoom: f64,
    /// Projection of the map.
    pub map_projection: Projection,
    /// Projection of coordinates shown to the user.
    pub display_projection: Projection,
    /// Control names in display order.
    pub controls: Vec<String>,
    /// Constructor options keyed by control name.
    pub control_options: OptionMap,
}

impl MapOptions {
    /// Options of a map element without attributes.
    pub fn from_defaults(defaults: &Defaults, lib: MapLib) -> Result<Self> {
        let controls = match lib {
            MapLib::OpenLayers => &defaults.ol_controls,
            MapLib::Leaflet => &defaults.leaflet_controls,
        };

        Ok(Self {
            center: defaults.default_center()?,
            zoom: defaults.zoom,
            map_projection: Projection::new(&defaults.map_projection()),
            display_projection: Projection::new(&defaults.display_projection()),
            controls: split_controls(controls),
            control_options: defaults.ol_ctrl_opts.clone(),
        })
    }

    /// Reads the attributes of a map element, falling back to `defaults`.
    pub fn from_attributes(
        bag: &AttributeBag,
        defaults: &Defaults,
        normalizer: &AttributeNormalizer,
        lib: MapLib,
    ) -> Result<Self> {
        let mut options = Self::from_defaults(defaults, lib)?;

        if let Some(center) = bag.get("center") {
            options.center = parse_center(center)?;
        }

        if let Some(zoom) = bag.get("zoom") {
            options.zoom = normalizer
                .resolve(zoom)
                .into_value()
                .as_f64()
                .ok_or_else(|| {
                    AzimuthError::invalid_option("zoom", format!("`{zoom}` is not a number"))
                })?;
        }

        if let Some(projection) = bag.first_of(&["projection", "proj", "crs"]) {
            options.map_projection = Projection::new(projection);
        }
        if let Some(projection) = bag.first_of(&["dispProjection", "dispProj"]) {
            options.display_projection = Projection::new(projection);
        }

        if let Some(controls) = bag.get("controls") {
            options.controls = split_controls(controls);
        }

        if let Some(raw) = bag.get("controlOpts") {
            match normalizer.resolve(raw) {
                Resolution::Resolved(OptionValue::Object(explicit)) => {
                    options.control_options.extend(explicit)
                }
                Resolution::Resolved(OptionValue::Null) => {}
                other => log::warn!("Control options `{raw}` are not an object, ignoring: {other:?}"),
            }
        }

        Ok(options)
    }
}

fn split_controls(controls: &str) -> Vec<String> {
    controls
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn parse_center(center: &str) -> Result<[f64; 2]> {
    let invalid = || AzimuthError::invalid_option("center", format!("`{center}` is not `x,y`"));
    let mut parts = center.split(',').map(|part| part.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Ok([x, y]),
        _ => Err(invalid()),
    }
}

/// Upper-cases the first character, turning a control name into its class name.
pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Backend-native map object.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeMapKind {
    /// `OpenLayers.Map`.
    OpenLayers(OlMap),
    /// `L.Map`.
    Leaflet(LeafletMap),
}

impl NativeMapKind {
    /// Library of the map.
    pub fn backend(&self) -> MapLib {
        match self {
            Self::OpenLayers(_) => MapLib::OpenLayers,
            Self::Leaflet(_) => MapLib::Leaflet,
        }
    }

    /// Layer stack of the map.
    pub fn layers(&self) -> &[LayerHandle] {
        match self {
            Self::OpenLayers(map) => &map.layers,
            Self::Leaflet(map) => &map.layers,
        }
    }
}

/// Event as fired by a native map.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    /// Event type, e.g. `moveend`.
    pub event_type: String,
    /// Payload fields.
    pub properties: OptionMap,
}

impl NativeEvent {
    /// Creates an event.
    pub fn new(event_type: impl Into<String>, properties: OptionMap) -> Self {
        Self {
            event_type: event_type.into().to_ascii_lowercase(),
            properties,
        }
    }
}

impl Event for NativeEvent {
    fn name(&self) -> &str {
        &self.event_type
    }
}

/// Event delivered to listeners and to the host element.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    /// Name the listener was registered under.
    pub name: String,
    /// Type reported by the native event.
    pub source_event_type: String,
    /// Payload fields.
    pub properties: OptionMap,
}

impl MapEvent {
    pub(crate) fn from_native(name: &str, native: &NativeEvent) -> Self {
        let mut properties = native.properties.clone();
        properties.remove("type");
        Self {
            name: name.to_string(),
            source_event_type: native.event_type.clone(),
            properties,
        }
    }

    /// Local variables of a binding expression: the payload fields, the native event type as
    /// `sourceEventType` and `evtType`, and the whole payload as `$event`.
    pub fn to_locals(&self) -> OptionMap {
        let mut payload = self.properties.clone();
        payload.insert("evtType".into(), self.source_event_type.as_str().into());
        payload.insert(
            "sourceEventType".into(),
            self.source_event_type.as_str().into(),
        );

        let mut locals = payload.clone();
        locals.insert("$event".into(), payload.into());
        locals
    }
}

/// Concrete map bound to a host element.
pub struct NativeMap {
    kind: NativeMapKind,
    events: EventChannel<NativeEvent>,
    destroyed: AtomicBool,
}

impl NativeMap {
    fn new(kind: NativeMapKind) -> Self {
        Self {
            kind,
            events: EventChannel::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Native map object.
    pub fn kind(&self) -> &NativeMapKind {
        &self.kind
    }

    /// Layers the map was created with.
    pub fn layers(&self) -> &[LayerHandle] {
        self.kind.layers()
    }

    /// Subscribes to native events of type `event_type`.
    pub fn on(
        &self,
        event_type: &str,
        listener: impl Fn(&NativeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.on(&event_type.to_ascii_lowercase(), listener)
    }

    /// Fires an event, as the rendering engine does on user interaction. Returns the number of
    /// listeners invoked.
    pub fn fire(&self, event: &NativeEvent) -> usize {
        if self.is_destroyed() {
            log::debug!("Ignoring `{}` on a destroyed map", event.event_type);
            return 0;
        }
        self.events.emit(event)
    }

    /// Number of listeners of `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.events.subscriber_count(&event_type.to_ascii_lowercase())
    }

    /// Whether the map was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.events.clear();
    }
}

impl fmt::Debug for NativeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMap")
            .field("kind", &self.kind)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Builds native maps for one backend.
pub struct MapBuilder {
    lib: MapLib,
}

impl MapBuilder {
    /// Creates a builder for `lib`.
    pub fn new(lib: MapLib) -> Self {
        Self { lib }
    }

    /// Builds a map holding the in-map layers of the registry.
    ///
    /// Layers built for another library are left out.
    pub fn construct(&self, ctx: &BuildContext, options: &MapOptions) -> Result<NativeMap> {
        let layers: Vec<_> = ctx
            .registry
            .layers_in_map()
            .into_iter()
            .filter(|layer| {
                let same = layer.backend() == self.lib;
                if !same {
                    log::warn!(
                        "Skipping {} layer {:?} on {} map",
                        layer.backend(),
                        layer.name(),
                        self.lib
                    );
                }
                same
            })
            .collect();

        let kind = self.lib.backend().map(ctx, options, layers)?;
        log::info!(
            "Constructed {} map with {} layers",
            self.lib,
            kind.layers().len()
        );
        Ok(NativeMap::new(kind))
    }
}

/// Event binding declared on a map element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    /// Lower-case event name.
    pub name: String,
    /// Expression evaluated on every event.
    pub expression: String,
}

/// Collects the event bindings of a map element: attributes named `map<event>`.
pub fn parse_events(bag: &AttributeBag) -> Vec<EventBinding> {
    static EVENT_ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    let pattern =
        EVENT_ATTRIBUTE.get_or_init(|| Regex::new(r"(?i)^map").expect("valid event pattern"));

    bag.iter()
        .filter(|(attribute, _)| !MAP_ATTRIBUTES.contains(attribute))
        .filter_map(|(attribute, expression)| {
            let name = pattern.find(attribute).map(|m| &attribute[m.end()..])?;
            (!name.is_empty()).then(|| EventBinding {
                name: name.to_ascii_lowercase(),
                expression: expression.to_string(),
            })
        })
        .collect()
}

/// Map returned to callers.
///
/// The handle shares the layer registry of the context it was built by. Destroying the handle
/// clears that registry.
pub struct MapHandle {
    map: NativeMap,
    bridge: Arc<EventBridge>,
    registry: Arc<LayerRegistry>,
    bindings: Mutex<Vec<Subscription>>,
    destroyed: AtomicBool,
}

impl MapHandle {
    pub(crate) fn new(map: NativeMap, bridge: EventBridge, registry: Arc<LayerRegistry>) -> Self {
        Self {
            map,
            bridge: Arc::new(bridge),
            registry,
            bindings: Mutex::new(vec![]),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Library of the map.
    pub fn backend(&self) -> MapLib {
        self.map.kind.backend()
    }

    /// Native map.
    pub fn native(&self) -> &NativeMap {
        &self.map
    }

    /// Host element of the map.
    pub fn host(&self) -> &Arc<dyn HostElement> {
        self.bridge.host()
    }

    /// Event bridge between the map and its host.
    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    /// Calls `handler` whenever the map fires `name`. The event is triggered on the host element
    /// first and a host notification is scheduled afterwards.
    ///
    /// Returns `None` once the map is destroyed.
    pub fn register_event_listener(
        &self,
        name: &str,
        handler: impl Fn(&MapEvent) + Send + Sync + 'static,
    ) -> Option<Subscription> {
        if self.is_destroyed() {
            log::warn!("Cannot listen to `{name}` on a destroyed map");
            return None;
        }

        let name = name.to_ascii_lowercase();
        let bridge = self.bridge.clone();
        let event_name = name.clone();
        let subscription = self.map.on(&name, move |native| {
            bridge.dispatch(&event_name, native, &handler);
        });

        self.bindings.lock().push(subscription.clone());
        Some(subscription)
    }

    /// Registers a listener per binding evaluating the binding expression with the event payload
    /// as local variables.
    pub fn bind_events(
        &self,
        bindings: &[EventBinding],
        evaluator: Arc<dyn ExpressionEvaluator>,
        scope: Arc<Scope>,
    ) {
        for binding in bindings {
            let evaluator = evaluator.clone();
            let scope = scope.clone();
            let expression = binding.expression.clone();
            self.register_event_listener(&binding.name, move |event| {
                let locals = event.to_locals();
                if let Err(err) = evaluator.evaluate(&expression, &scope, Some(&locals)) {
                    log::warn!("Handler `{expression}` of `{}` failed: {err}", event.name);
                }
            });
        }
    }

    /// Whether [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Releases the native map, drops all listeners and clears the layer registry.
    ///
    /// Only the first call has an effect. Returns whether this call destroyed the map.
    pub fn destroy(&self) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        for binding in std::mem::take(&mut *self.bindings.lock()) {
            binding.unsubscribe();
        }
        self.map.destroy();
        self.registry.clear();
        log::info!("Destroyed {} map on {}", self.backend(), self.host().id());
        true
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle")
            .field("host", &self.host().id())
            .field("map", &self.map)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
