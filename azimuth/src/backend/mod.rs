//! Map rendering backends.
//!
//! Each backend implements [`LayerBackend`] once, with one method per layer kind and one for the
//! map itself. The methods turn normalized options into the native objects of that backend,
//! register new layers with the [`LayerRegistry`] and never touch the registry on failure.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::attributes::LayerOptions;
use crate::config::Defaults;
use crate::error::{AzimuthError, Result};
use crate::fetch::DataFetcher;
use crate::layer::{LayerHandle, LayerKind, LayerRegistry};
use crate::map::{MapOptions, NativeMapKind};
use crate::value::OptionValue;

pub mod leaflet;
pub mod openlayers;

pub use leaflet::Leaflet;
pub use openlayers::OpenLayers;

/// Identifier of a supported mapping library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapLib {
    /// OpenLayers.
    OpenLayers,
    /// Leaflet.
    Leaflet,
}

impl MapLib {
    /// Short identifier used by the `maplib` option.
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenLayers => "ol",
            Self::Leaflet => "leaflet",
        }
    }

    /// Global symbol the library installs when it is loaded.
    pub fn global_symbol(&self) -> &'static str {
        match self {
            Self::OpenLayers => "OpenLayers",
            Self::Leaflet => "L",
        }
    }

    /// Reads a `maplib` value. Matching is case-insensitive.
    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "ol" | "openlayers" => Some(Self::OpenLayers),
            "leaflet" | "l" => Some(Self::Leaflet),
            _ => None,
        }
    }

    /// The backend implementation.
    pub fn backend(&self) -> &'static dyn LayerBackend {
        match self {
            Self::OpenLayers => &OpenLayers,
            Self::Leaflet => &Leaflet,
        }
    }
}

impl fmt::Display for MapLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLayers => f.write_str("OpenLayers"),
            Self::Leaflet => f.write_str("Leaflet"),
        }
    }
}

/// Global symbols present in the page the map lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    globals: BTreeSet<String>,
}

impl Environment {
    /// Creates an environment without any globals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global symbol.
    pub fn with_global(mut self, symbol: impl Into<String>) -> Self {
        self.globals.insert(symbol.into());
        self
    }

    /// Adds the global symbol of a library.
    pub fn with_backend(self, lib: MapLib) -> Self {
        self.with_global(lib.global_symbol())
    }

    /// Whether a global symbol is present.
    pub fn has_global(&self, symbol: &str) -> bool {
        self.globals.contains(symbol)
    }

    /// Picks the library for an element.
    ///
    /// An explicit `maplib` option wins; otherwise OpenLayers is preferred over Leaflet when both
    /// are loaded.
    pub fn select_backend(&self, options: &LayerOptions) -> Result<MapLib> {
        if let Some(value) = options.get("maplib").filter(|value| value.is_truthy()) {
            let id = value.to_param_string();
            return MapLib::parse(&id).ok_or_else(|| {
                log::warn!("Unknown mapping library `{id}`");
                AzimuthError::MissingBackend
            });
        }

        [MapLib::OpenLayers, MapLib::Leaflet]
            .into_iter()
            .find(|lib| self.has_global(lib.global_symbol()))
            .ok_or(AzimuthError::MissingBackend)
    }
}

/// Everything a builder may read or update besides its own options.
pub struct BuildContext<'a> {
    /// Configuration defaults.
    pub defaults: &'a Defaults,
    /// Registry receiving new layers.
    pub registry: &'a Arc<LayerRegistry>,
    /// Fetcher for layers that load their content through the crate.
    pub fetcher: &'a Arc<dyn DataFetcher>,
}

/// Arguments of a single layer construction.
#[derive(Debug, Clone, Default)]
pub struct LayerRequest {
    /// Layer name.
    pub name: Option<String>,
    /// Layer URL.
    pub url: Option<String>,
    /// Normalized options.
    pub options: LayerOptions,
    /// Whether the layer element is nested in a map element.
    pub is_in_map: bool,
}

impl LayerRequest {
    pub(crate) fn required_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AzimuthError::invalid_option("url", "a URL is required"))
    }
}

/// Constructs layers and maps with one library's native API.
pub trait LayerBackend: Send + Sync {
    /// Library implemented by this backend.
    fn lib(&self) -> MapLib;

    /// Builds a tile layer.
    fn tiles(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle>;

    /// Builds a WMS layer.
    fn wms(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle>;

    /// Builds a GeoJSON vector layer.
    fn geojson(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle>;

    /// Builds a point marker layer.
    fn marker(&self, _ctx: &BuildContext, _request: LayerRequest) -> Result<LayerHandle> {
        Err(AzimuthError::UnsupportedLayerKind {
            kind: LayerKind::Marker.to_string(),
            backend: self.lib(),
        })
    }

    /// Builds the native map with the given initial layer stack.
    fn map(
        &self,
        ctx: &BuildContext,
        options: &MapOptions,
        layers: Vec<LayerHandle>,
    ) -> Result<NativeMapKind>;

    /// Dispatches to the builder of `kind`.
    fn build(
        &self,
        kind: LayerKind,
        ctx: &BuildContext,
        request: LayerRequest,
    ) -> Result<LayerHandle> {
        log::debug!(
            "Building {kind} layer {:?} with {}",
            request.name,
            self.lib()
        );
        match kind {
            LayerKind::Tiles => self.tiles(ctx, request),
            LayerKind::Wms => self.wms(ctx, request),
            LayerKind::GeoJson => self.geojson(ctx, request),
            LayerKind::Marker => self.marker(ctx, request),
        }
    }
}

/// Splits `keys` out of `options` into a new map.
pub(crate) fn take_keys(options: &mut LayerOptions, keys: &[&str]) -> LayerOptions {
    keys.iter()
        .filter_map(|key| options.remove_entry(*key))
        .collect()
}

/// Subdomains from the `subdomains` option, or `None` if the option is absent.
///
/// A string is comma separated, or one subdomain per character when it has no comma
/// (`"abc"` is `a`, `b`, `c`). A number is a single subdomain.
pub(crate) fn subdomain_list(options: &LayerOptions) -> Option<Vec<String>> {
    match options.get("subdomains")? {
        OptionValue::List(items) => Some(items.iter().map(OptionValue::to_param_string).collect()),
        OptionValue::String(s) if s.contains(',') => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(String::from)
                .collect(),
        ),
        OptionValue::String(s) if !s.trim().is_empty() => Some(
            s.chars()
                .filter(|c| !c.is_whitespace())
                .map(String::from)
                .collect(),
        ),
        number @ OptionValue::Number(_) => Some(vec![number.to_param_string()]),
        _ => None,
    }
}
