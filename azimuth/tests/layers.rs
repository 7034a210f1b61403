use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use azimuth::backend::leaflet::LeafletLayer;
use azimuth::backend::openlayers::OlLayer;
use azimuth::{
    AttributeBag, AzimuthError, DataState, Defaults, LayerKind, MapContext, MapLib, NativeLayer,
    OptionValue, RegistryEvent,
};
use parking_lot::Mutex;

mod common;

use common::{init_logger, MockFetcher, POINTS};

fn context(lib: MapLib, fetcher: MockFetcher) -> MapContext {
    init_logger();
    MapContext::builder()
        .with_backend(lib)
        .with_fetcher(fetcher)
        .build()
}

#[test]
fn openlayers_tiles_expand_subdomains() {
    let ctx = context(MapLib::OpenLayers, MockFetcher::failing(500));
    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "tiles")
                .with("lyr-url", "http://t${s}.example.com/{z}/{x}/{y}.png")
                .with("subdomains", "[1, 2]"),
            true,
        )
        .unwrap();

    assert_eq!(ctx.registry().layers(), [layer.clone()]);
    match &*layer.native() {
        NativeLayer::OpenLayers(OlLayer::Xyz(xyz)) => {
            assert_eq!(xyz.urls.len(), 2);
            assert!(xyz.urls.iter().all(|url| !url.contains("${s}")));
            assert_eq!(xyz.urls[0], "http://t1.example.com/{z}/{x}/{y}.png");
            assert_eq!(xyz.urls[1], "http://t2.example.com/{z}/{x}/{y}.png");
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[test]
fn leaflet_tiles_keep_single_template() {
    let ctx = context(MapLib::Leaflet, MockFetcher::failing(500));
    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "tiles")
                .with("lyr-url", "http://t${s}.example.com/${z}/${x}/${y}.png")
                .with("subdomains", "[1, 2]"),
            true,
        )
        .unwrap();

    match &*layer.native() {
        NativeLayer::Leaflet(LeafletLayer::Tile(tile)) => {
            assert_eq!(tile.url_template, "http://t{s}.example.com/{z}/{x}/{y}.png");
            assert_eq!(
                tile.subdomains,
                Some(vec!["1".to_string(), "2".to_string()])
            );
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[test]
fn marker_announces_itself() {
    let ctx = context(MapLib::OpenLayers, MockFetcher::failing(500));
    let announced = Arc::new(Mutex::new(vec![]));
    let inner = announced.clone();
    ctx.registry().on(RegistryEvent::NEW, move |event| {
        inner.lock().push(event.layer().clone());
    });

    let marker = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "marker")
                .with("name", "here")
                .with("latitude", "10")
                .with("longitude", "20"),
            true,
        )
        .unwrap();

    assert_eq!(*announced.lock(), [marker.clone()]);
    assert_eq!(ctx.registry().layers_in_map(), [marker.clone()]);
    assert_eq!(marker.kind(), LayerKind::Marker);

    match &*marker.native() {
        NativeLayer::OpenLayers(OlLayer::Markers(layer)) => {
            let position = layer.markers[0].position;
            assert_relative_eq!(position.lon, 2_226_389.815_9, epsilon = 1e-3);
            assert_relative_eq!(position.lat, 1_118_889.974_9, epsilon = 1e-3);
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[test]
fn marker_is_unsupported_on_leaflet() {
    let ctx = context(MapLib::Leaflet, MockFetcher::failing(500));
    let result = ctx.build_layer(
        &AttributeBag::new()
            .with("lyr-type", "marker")
            .with("lat", "10")
            .with("lon", "20"),
        true,
    );
    assert!(matches!(
        result,
        Err(AzimuthError::UnsupportedLayerKind {
            backend: MapLib::Leaflet,
            ..
        })
    ));
    assert!(ctx.registry().is_empty());
}

#[test]
fn explicit_maplib_overrides_detection() {
    init_logger();
    let ctx = MapContext::builder()
        .with_backend(MapLib::OpenLayers)
        .with_backend(MapLib::Leaflet)
        .with_fetcher(MockFetcher::failing(500))
        .build();

    let ol = ctx
        .build_layer(&AttributeBag::new().with("lyr-type", "tiles"), true)
        .unwrap();
    let leaflet = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "tiles")
                .with("maplib", "leaflet"),
            true,
        )
        .unwrap();

    assert_eq!(ol.backend(), MapLib::OpenLayers);
    assert_eq!(leaflet.backend(), MapLib::Leaflet);
    assert_eq!(ctx.registry().layers(), [leaflet, ol]);
}

#[test]
fn explicit_options_win_and_version_stays_text() {
    let ctx = context(MapLib::OpenLayers, MockFetcher::failing(500));
    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "wms")
                .with("lyr-url", "http://example.com/wms")
                .with("format", "image/jpeg")
                .with("version", "1.1.1")
                .with("lyr-options", "{format: 'image/png'}"),
            false,
        )
        .unwrap();

    match &*layer.native() {
        NativeLayer::OpenLayers(OlLayer::Wms(wms)) => {
            assert_eq!(wms.params["format"], OptionValue::from("image/png"));
            assert_eq!(wms.params["version"], OptionValue::from("1.1.1"));
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[test]
fn custom_defaults_drive_builders() {
    init_logger();
    let defaults = Defaults::from_json(
        r#"{"defaults": {"CRS": "900913", "TILE_URL": "http://tiles${s}.example.org/${z}/${x}/${y}.png", "SUBDOMAINS": ["a"]}}"#,
    )
    .unwrap();
    let ctx = MapContext::builder()
        .with_defaults(defaults)
        .with_backend(MapLib::OpenLayers)
        .with_fetcher(MockFetcher::failing(500))
        .build();

    let layer = ctx
        .build_layer(&AttributeBag::new().with("lyr-type", "tiles"), true)
        .unwrap();
    match &*layer.native() {
        NativeLayer::OpenLayers(OlLayer::Xyz(xyz)) => {
            assert_eq!(xyz.urls, ["http://tilesa.example.org/${z}/${x}/${y}.png"]);
            assert_eq!(xyz.options["projection"], OptionValue::from("EPSG:900913"));
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[tokio::test]
async fn leaflet_geojson_arrives_later() {
    let ctx = context(MapLib::Leaflet, MockFetcher::serving(POINTS));
    let loaded = Arc::new(AtomicUsize::new(0));
    let counter = loaded.clone();
    ctx.registry().on(RegistryEvent::DATA, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "geojson")
                .with("lyr-url", "http://example.com/points.json")
                .with("params", "{limit: 2}"),
            true,
        )
        .unwrap();

    assert_eq!(layer.data_ready().await, DataState::Ready);
    assert_eq!(loaded.load(Ordering::SeqCst), 1);
    match &*layer.native() {
        NativeLayer::Leaflet(LeafletLayer::GeoJson(geojson)) => {
            assert_eq!(geojson.name, "Vector");
            assert_eq!(geojson.features.len(), 2);
        }
        other => panic!("unexpected layer {other:?}"),
    };
}

#[tokio::test]
async fn leaflet_geojson_failure_is_reported() {
    let ctx = context(MapLib::Leaflet, MockFetcher::failing(404));
    let errors = Arc::new(Mutex::new(vec![]));
    let inner = errors.clone();
    ctx.registry().on(RegistryEvent::ERROR, move |event| {
        if let RegistryEvent::LayerError { message, .. } = event {
            inner.lock().push(message.clone());
        }
    });

    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "geojson")
                .with("lyr-url", "http://example.com/missing.json"),
            true,
        )
        .unwrap();

    let DataState::Failed(reason) = layer.data_ready().await else {
        panic!("expected failure")
    };
    assert!(reason.contains("404"));
    assert_eq!(errors.lock().len(), 1);
    assert!(ctx.registry().contains(&layer));
}
