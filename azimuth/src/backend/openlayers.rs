//! OpenLayers backend.
//!
//! OpenLayers stacks layers in the order they are handed to the map, so every builder appends to
//! the registry.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::{subdomain_list, take_keys, BuildContext, LayerBackend, LayerRequest, MapLib};
use crate::attributes::LayerOptions;
use crate::error::{AzimuthError, Result};
use crate::layer::{DataState, LayerHandle, LayerKind, NativeLayer, RegistryEvent};
use crate::map::{capitalize, MapOptions, NativeMapKind};
use crate::projection::{LonLat, Projection};
use crate::value::OptionValue;

/// Keys sent to a WMS server as request parameters.
pub const WMS_PARAM_KEYS: &[&str] = &[
    "styles",
    "layers",
    "version",
    "format",
    "exceptions",
    "transparent",
    "crs",
    "srs",
];

const VECTOR_LAYER_KEYS: &[&str] = &["style", "styleMap", "filter", "projection"];

const MARKER_KEYS: &[&str] = &[
    "latitude",
    "lat",
    "longitude",
    "lon",
    "icon",
    "iconWidth",
    "iconHeight",
];

/// Control classes of `OpenLayers.Control`.
pub const CONTROL_TYPES: &[&str] = &[
    "ArgParser",
    "Attribution",
    "DragPan",
    "Geolocate",
    "Graticule",
    "KeyboardDefaults",
    "LayerSwitcher",
    "Measure",
    "MousePosition",
    "NavToolbar",
    "Navigation",
    "NavigationHistory",
    "OverviewMap",
    "Pan",
    "PanPanel",
    "PanZoom",
    "PanZoomBar",
    "Permalink",
    "PinchZoom",
    "Scale",
    "ScaleLine",
    "TouchNavigation",
    "WMSGetFeatureInfo",
    "Zoom",
    "ZoomBox",
    "ZoomIn",
    "ZoomOut",
    "ZoomPanel",
    "ZoomToMaxExtent",
];

const SUBDOMAIN_TOKEN: &str = "${s}";

/// Layer objects of OpenLayers.
#[derive(Debug, Clone, PartialEq)]
pub enum OlLayer {
    /// `OpenLayers.Layer.XYZ`.
    Xyz(OlXyzLayer),
    /// `OpenLayers.Layer.WMS`.
    Wms(OlWmsLayer),
    /// `OpenLayers.Layer.Vector`.
    Vector(OlVectorLayer),
    /// `OpenLayers.Layer.Markers`.
    Markers(OlMarkersLayer),
}

/// XYZ tile layer with one URL per subdomain.
#[derive(Debug, Clone, PartialEq)]
pub struct OlXyzLayer {
    /// Layer name.
    pub name: Option<String>,
    /// Tile URL templates; OpenLayers cycles through them.
    pub urls: Vec<String>,
    /// Layer options.
    pub options: LayerOptions,
}

/// WMS layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OlWmsLayer {
    /// Layer name.
    pub name: Option<String>,
    /// Service URL.
    pub url: String,
    /// Request parameters.
    pub params: LayerOptions,
    /// Display options.
    pub options: LayerOptions,
}

/// Loading strategy of a vector layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OlStrategy {
    /// Load everything once.
    Fixed,
    /// Load features within the current extent.
    Bbox,
    /// Page through features.
    Paging,
    /// Reload periodically.
    Refresh,
    /// Cluster nearby features.
    Cluster,
}

impl OlStrategy {
    /// Reads a strategy name. Matching is case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "bbox" => Some(Self::Bbox),
            "paging" => Some(Self::Paging),
            "refresh" => Some(Self::Refresh),
            "cluster" => Some(Self::Cluster),
            _ => None,
        }
    }
}

/// `OpenLayers.Protocol.HTTP` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OlHttpProtocol {
    /// Resource URL.
    pub url: String,
    /// Response format.
    pub format: &'static str,
    /// Remaining protocol options.
    pub options: LayerOptions,
}

/// Vector layer loaded through an HTTP protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct OlVectorLayer {
    /// Layer name.
    pub name: Option<String>,
    /// Protocol fetching the features.
    pub protocol: OlHttpProtocol,
    /// Loading strategies.
    pub strategies: Vec<OlStrategy>,
    /// Rendering options (style, filter, projection).
    pub options: LayerOptions,
}

/// Marker icon.
#[derive(Debug, Clone, PartialEq)]
pub struct OlIcon {
    /// Image URL.
    pub url: String,
    /// Width and height in pixels.
    pub size: (f64, f64),
    /// Pixel offset of the image relative to the marker position.
    pub offset: (f64, f64),
}

/// Single marker.
#[derive(Debug, Clone, PartialEq)]
pub struct OlMarker {
    /// Position in the map projection.
    pub position: LonLat,
    /// Icon.
    pub icon: OlIcon,
}

/// Marker layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OlMarkersLayer {
    /// Layer name.
    pub name: Option<String>,
    /// Markers of the layer.
    pub markers: Vec<OlMarker>,
    /// Layer options.
    pub options: LayerOptions,
}

/// `OpenLayers.Control` instance.
#[derive(Debug, Clone, PartialEq)]
pub struct OlControl {
    /// Class name, e.g. `Zoom`.
    pub class: String,
    /// Constructor options.
    pub options: LayerOptions,
}

/// `OpenLayers.Map` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OlMap {
    /// Projection of the map.
    pub projection: Projection,
    /// Projection of coordinates shown to the user.
    pub display_projection: Projection,
    /// Controls.
    pub controls: Vec<OlControl>,
    /// Center in the map projection.
    pub center: LonLat,
    /// Zoom level.
    pub zoom: f64,
    /// Initial layer stack.
    pub layers: Vec<LayerHandle>,
}

/// OpenLayers implementation of [`LayerBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenLayers;

impl OpenLayers {
    fn register(
        &self,
        ctx: &BuildContext,
        name: Option<String>,
        kind: LayerKind,
        is_in_map: bool,
        layer: OlLayer,
    ) -> LayerHandle {
        let handle = LayerHandle::new(
            name,
            kind,
            MapLib::OpenLayers,
            is_in_map,
            NativeLayer::OpenLayers(layer),
            DataState::Ready,
        );
        ctx.registry.append(handle.clone());
        handle
    }
}

impl LayerBackend for OpenLayers {
    fn lib(&self) -> MapLib {
        MapLib::OpenLayers
    }

    fn tiles(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let LayerRequest {
            name,
            url,
            mut options,
            is_in_map,
        } = request;

        let template = url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| ctx.defaults.tile_url.clone());
        let subdomains = subdomain_list(&options)
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| ctx.defaults.subdomains.clone());

        let urls = match template.split_once(SUBDOMAIN_TOKEN) {
            Some((prefix, suffix)) if !subdomains.is_empty() => {
                options.remove("subdomains");
                subdomains
                    .iter()
                    .map(|subdomain| {
                        format!("{}{subdomain}{suffix}", substitute_tokens(prefix, &options))
                    })
                    .collect()
            }
            _ => vec![template],
        };

        let mut layer_options = LayerOptions::new();
        layer_options.insert(
            "projection".into(),
            ctx.defaults.map_projection().into(),
        );
        layer_options.insert("transitionEffect".into(), "resize".into());
        layer_options.insert("wrapDateLine".into(), true.into());
        layer_options.extend(options);

        let layer = OlLayer::Xyz(OlXyzLayer {
            name: name.clone(),
            urls,
            options: layer_options,
        });
        Ok(self.register(ctx, name, LayerKind::Tiles, is_in_map, layer))
    }

    fn wms(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let url = request.required_url()?.to_string();
        let LayerRequest {
            name,
            mut options,
            is_in_map,
            ..
        } = request;

        let params = take_keys(&mut options, WMS_PARAM_KEYS);
        let layer = OlLayer::Wms(OlWmsLayer {
            name: name.clone(),
            url,
            params,
            options,
        });
        Ok(self.register(ctx, name, LayerKind::Wms, is_in_map, layer))
    }

    fn geojson(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let url = request.required_url()?.to_string();
        let LayerRequest {
            name,
            mut options,
            is_in_map,
            ..
        } = request;

        let strategy = match options.remove("strategy") {
            None | Some(OptionValue::Null) => OlStrategy::Fixed,
            Some(value) => {
                let strategy = value.to_param_string();
                OlStrategy::parse(&strategy).ok_or_else(|| {
                    AzimuthError::invalid_option(
                        "strategy",
                        format!("unknown strategy `{strategy}`"),
                    )
                })?
            }
        };
        let layer_options = take_keys(&mut options, VECTOR_LAYER_KEYS);

        let layer = OlLayer::Vector(OlVectorLayer {
            name: name.clone(),
            protocol: OlHttpProtocol {
                url,
                format: "GeoJSON",
                options,
            },
            strategies: vec![strategy],
            options: layer_options,
        });
        Ok(self.register(ctx, name, LayerKind::GeoJson, is_in_map, layer))
    }

    fn marker(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let LayerRequest {
            name,
            mut options,
            is_in_map,
            ..
        } = request;

        let lat = coordinate(&options, &["latitude", "lat"])?;
        let lon = coordinate(&options, &["longitude", "lon"])?;
        let position = LonLat::new(lon, lat).transform(
            &Projection::new(&ctx.defaults.srs),
            &Projection::new(&ctx.defaults.map_projection()),
        );

        let marker_defaults = &ctx.defaults.marker;
        let url = options
            .get("icon")
            .and_then(OptionValue::as_str)
            .unwrap_or(&marker_defaults.icon)
            .to_string();
        let width = options
            .get("iconWidth")
            .and_then(OptionValue::as_f64)
            .unwrap_or(marker_defaults.dims.width);
        let height = options
            .get("iconHeight")
            .and_then(OptionValue::as_f64)
            .unwrap_or(marker_defaults.dims.height);
        take_keys(&mut options, MARKER_KEYS);

        let layer = OlLayer::Markers(OlMarkersLayer {
            name: name.clone(),
            markers: vec![OlMarker {
                position,
                icon: OlIcon {
                    url,
                    size: (width, height),
                    offset: (-(width / 2.0), -height),
                },
            }],
            options,
        });

        let handle = self.register(ctx, name, LayerKind::Marker, is_in_map, layer);
        ctx.registry
            .emit(&RegistryEvent::LayerNew(handle.clone()));
        Ok(handle)
    }

    fn map(
        &self,
        _ctx: &BuildContext,
        options: &MapOptions,
        layers: Vec<LayerHandle>,
    ) -> Result<NativeMapKind> {
        let controls = options
            .controls
            .iter()
            .map(|name| {
                let class = capitalize(name);
                if !CONTROL_TYPES.contains(&class.as_str()) {
                    return Err(AzimuthError::UnknownControl {
                        control: name.clone(),
                        backend: MapLib::OpenLayers,
                    });
                }

                Ok(OlControl {
                    class,
                    options: options
                        .control_options
                        .get(name)
                        .and_then(OptionValue::as_object)
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let [lon, lat] = options.center;
        let center =
            LonLat::new(lon, lat).transform(&Projection::wgs84(), &options.map_projection);

        Ok(NativeMapKind::OpenLayers(OlMap {
            projection: options.map_projection.clone(),
            display_projection: options.display_projection.clone(),
            controls,
            center,
            zoom: options.zoom,
            layers,
        }))
    }
}

fn coordinate(options: &LayerOptions, keys: &[&str]) -> Result<f64> {
    let value = keys
        .iter()
        .find_map(|key| options.get(*key))
        .ok_or_else(|| AzimuthError::invalid_option(keys[0], "coordinate is required"))?;

    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| AzimuthError::invalid_option(keys[0], format!("{value:?} is not a number")))
}

/// Replaces `${key}` tokens with option values, leaving unknown tokens in place.
fn substitute_tokens(template: &str, options: &LayerOptions) -> String {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("valid token pattern"));

    token
        .replace_all(template, |caps: &Captures| match options.get(&caps[1]) {
            Some(value) => value.to_param_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
