//! Leaflet backend.
//!
//! Leaflet draws layers added later on top of earlier ones, while markup lists background layers
//! first. Builders therefore prepend to the registry so that the first declared layer ends up on
//! top once the stack is handed to the map.

use std::sync::Arc;

use geojson::{Feature, GeoJson};

use super::openlayers::WMS_PARAM_KEYS;
use super::{subdomain_list, take_keys, BuildContext, LayerBackend, LayerRequest, MapLib};
use crate::async_runtime;
use crate::attributes::LayerOptions;
use crate::error::{AzimuthError, Result};
use crate::fetch::{DataFetcher, FetchRequest};
use crate::layer::{DataState, LayerHandle, LayerKind, LayerRegistry, NativeLayer, RegistryEvent};
use crate::map::{capitalize, MapOptions, NativeMapKind};
use crate::projection::Projection;
use crate::value::OptionValue;

const GEOJSON_LAYER_KEYS: &[&str] = &["pointToLayer", "style", "filter", "onEachFeature"];

/// Control classes of `L.Control`.
pub const CONTROL_TYPES: &[&str] = &["Attribution", "Layers", "Scale", "Zoom"];

const DEFAULT_VECTOR_NAME: &str = "Vector";

/// Layer objects of Leaflet.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafletLayer {
    /// `L.TileLayer`.
    Tile(LeafletTileLayer),
    /// `L.TileLayer.WMS`.
    Wms(LeafletWmsLayer),
    /// `L.GeoJSON`.
    GeoJson(LeafletGeoJsonLayer),
}

/// Tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletTileLayer {
    /// Layer name.
    pub name: Option<String>,
    /// URL template with `{s}`, `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    /// Subdomains substituted for `{s}`, `None` when disabled.
    pub subdomains: Option<Vec<String>>,
    /// Layer options.
    pub options: LayerOptions,
}

/// WMS tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletWmsLayer {
    /// Layer name.
    pub name: Option<String>,
    /// Service URL.
    pub url: String,
    /// Parameters of every tile request.
    pub wms_params: LayerOptions,
    /// Display options.
    pub options: LayerOptions,
    explicit_projection: LayerOptions,
}

impl LeafletWmsLayer {
    /// Parameter carrying the request projection: `crs` from WMS 1.3 on, `srs` before.
    pub fn projection_key(&self) -> &'static str {
        let version = self
            .wms_params
            .get("version")
            .map(OptionValue::to_param_string)
            .unwrap_or_default();
        if parse_version(&version) >= (1, 3) {
            "crs"
        } else {
            "srs"
        }
    }

    /// Sets the projection parameter before tiles are requested.
    ///
    /// Leaflet writes the map projection into the parameter. A value given in the layer options
    /// takes precedence.
    pub fn prepare_request(&mut self, map_crs: &Projection) {
        let key = self.projection_key();
        let value = self
            .explicit_projection
            .get(key)
            .cloned()
            .unwrap_or_else(|| map_crs.code().into());
        log::trace!("WMS layer {:?} requests {key}={value:?}", self.name);
        self.wms_params.insert(key.to_string(), value);
    }
}

/// GeoJSON layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletGeoJsonLayer {
    /// Layer name.
    pub name: String,
    /// Rendering hooks and styles.
    pub options: LayerOptions,
    /// Features added so far.
    pub features: Vec<Feature>,
}

impl LeafletGeoJsonLayer {
    /// Adds the features of a GeoJSON document.
    pub fn add_data(&mut self, data: GeoJson) {
        match data {
            GeoJson::FeatureCollection(collection) => self.features.extend(collection.features),
            GeoJson::Feature(feature) => self.features.push(feature),
            GeoJson::Geometry(geometry) => self.features.push(Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }),
        }
    }
}

/// `L.LatLng`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// `L.Control` instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletControl {
    /// Class name, e.g. `Zoom`.
    pub class: String,
    /// Constructor options.
    pub options: LayerOptions,
}

/// `L.Map` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletMap {
    /// Name of the `L.CRS` object, e.g. `EPSG3857`.
    pub crs: String,
    /// Geographic center.
    pub center: LatLng,
    /// Zoom level.
    pub zoom: f64,
    /// Controls.
    pub controls: Vec<LeafletControl>,
    /// Initial layer stack.
    pub layers: Vec<LayerHandle>,
}

/// Leaflet implementation of [`LayerBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Leaflet;

impl Leaflet {
    fn register(
        &self,
        ctx: &BuildContext,
        name: Option<String>,
        kind: LayerKind,
        is_in_map: bool,
        layer: LeafletLayer,
        state: DataState,
    ) -> LayerHandle {
        let handle = LayerHandle::new(
            name,
            kind,
            MapLib::Leaflet,
            is_in_map,
            NativeLayer::Leaflet(layer),
            state,
        );
        ctx.registry.prepend(handle.clone());
        handle
    }
}

impl LayerBackend for Leaflet {
    fn lib(&self) -> MapLib {
        MapLib::Leaflet
    }

    fn tiles(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let LayerRequest {
            name,
            url,
            mut options,
            is_in_map,
        } = request;

        let url_template = url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| ctx.defaults.tile_url.clone())
            .replace("${", "{");
        let subdomains = match options.get("subdomains") {
            Some(OptionValue::Bool(false)) => None,
            _ => Some(
                subdomain_list(&options)
                    .filter(|list| !list.is_empty())
                    .unwrap_or_else(|| ctx.defaults.subdomains.clone()),
            ),
        };
        options.remove("subdomains");

        let mut layer_options = LayerOptions::new();
        layer_options.insert("noWrap".into(), false.into());
        layer_options.extend(options);

        let layer = LeafletLayer::Tile(LeafletTileLayer {
            name: name.clone(),
            url_template,
            subdomains,
            options: layer_options,
        });
        Ok(self.register(
            ctx,
            name,
            LayerKind::Tiles,
            is_in_map,
            layer,
            DataState::Ready,
        ))
    }

    fn wms(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let url = request.required_url()?.replace("${", "{");
        let LayerRequest {
            name,
            mut options,
            is_in_map,
            ..
        } = request;

        let mut params = take_keys(&mut options, WMS_PARAM_KEYS);
        let transparent = params.get("transparent").is_some_and(OptionValue::is_truthy);
        let jpeg_or_unset = params
            .get("format")
            .and_then(OptionValue::as_str)
            .map_or(true, |format| format.contains("jpg") || format.contains("jpeg"));
        if transparent && jpeg_or_unset {
            params.insert("format".into(), "image/png".into());
        }
        let explicit_projection = params
            .iter()
            .filter(|(key, _)| matches!(key.as_str(), "crs" | "srs"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut wms_params = LayerOptions::new();
        wms_params.insert("service".into(), "WMS".into());
        wms_params.insert("request".into(), "GetMap".into());
        wms_params.insert("version".into(), "1.1.1".into());
        wms_params.insert("layers".into(), "".into());
        wms_params.insert("styles".into(), "".into());
        wms_params.insert("format".into(), "image/jpeg".into());
        wms_params.insert("transparent".into(), false.into());
        wms_params.extend(params);

        let layer = LeafletLayer::Wms(LeafletWmsLayer {
            name: name.clone(),
            url,
            wms_params,
            options,
            explicit_projection,
        });
        Ok(self.register(
            ctx,
            name,
            LayerKind::Wms,
            is_in_map,
            layer,
            DataState::Ready,
        ))
    }

    fn geojson(&self, ctx: &BuildContext, request: LayerRequest) -> Result<LayerHandle> {
        let url = request.required_url()?.to_string();
        let LayerRequest {
            name,
            mut options,
            is_in_map,
            ..
        } = request;

        let layer_options = take_keys(&mut options, GEOJSON_LAYER_KEYS);
        let fetch_request = FetchRequest::new(url, options.get("params"));

        let layer = LeafletLayer::GeoJson(LeafletGeoJsonLayer {
            name: name
                .clone()
                .unwrap_or_else(|| DEFAULT_VECTOR_NAME.to_string()),
            options: layer_options,
            features: vec![],
        });
        let handle = self.register(
            ctx,
            name,
            LayerKind::GeoJson,
            is_in_map,
            layer,
            DataState::Pending,
        );

        let spawned = async_runtime::spawn(load_geojson(
            handle.clone(),
            ctx.fetcher.clone(),
            ctx.registry.clone(),
            fetch_request,
        ));
        if !spawned {
            handle.set_data_state(DataState::Failed("no async runtime".into()));
        }

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
                        backend: MapLib::Leaflet,
                    });
                }

                Ok(LeafletControl {
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

        for layer in &layers {
            if let NativeLayer::Leaflet(LeafletLayer::Wms(wms)) = &mut *layer.native_mut() {
                wms.prepare_request(&options.map_projection);
            }
        }

        let [lng, lat] = options.center;
        Ok(NativeMapKind::Leaflet(LeafletMap {
            crs: options.map_projection.compact_code(),
            center: LatLng { lat, lng },
            zoom: options.zoom,
            controls,
            layers,
        }))
    }
}

async fn load_geojson(
    handle: LayerHandle,
    fetcher: Arc<dyn DataFetcher>,
    registry: Arc<LayerRegistry>,
    request: FetchRequest,
) {
    match fetcher.fetch_geojson(&request).await {
        Ok(data) => {
            if let NativeLayer::Leaflet(LeafletLayer::GeoJson(layer)) = &mut *handle.native_mut() {
                layer.add_data(data);
                log::debug!(
                    "Layer {:?} received {} features",
                    handle.id(),
                    layer.features.len()
                );
            }
            handle.set_data_state(DataState::Ready);
            registry.emit(&RegistryEvent::LayerData(handle));
        }
        Err(err) => {
            log::warn!("Failed to load data of layer {:?}: {err}", handle.id());
            let message = err.to_string();
            handle.set_data_state(DataState::Failed(message.clone()));
            registry.emit(&RegistryEvent::LayerError {
                layer: handle,
                message,
            });
        }
    }
}

fn parse_version(version: &str) -> (u32, u32) {
    let mut parts = version
        .split('.')
        .map(|part| part.trim().parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor)
}
