use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use azimuth::backend::leaflet::LeafletLayer;
use azimuth::{
    AttributeBag, AzimuthError, Callback, DataState, MapContext, MapLib, NativeEvent, NativeLayer,
    NativeMapKind, OptionMap, OptionValue, QueueScheduler, RegistryEvent, Scope,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

mod common;

use common::{init_logger, GatedFetcher, MockFetcher, MockHost, POINTS};

fn context(lib: MapLib, scheduler: Arc<QueueScheduler>, scope: Scope) -> MapContext {
    init_logger();
    MapContext::builder()
        .with_backend(lib)
        .with_fetcher(MockFetcher::failing(500))
        .with_scheduler(scheduler)
        .with_scope(scope)
        .build()
}

fn tiles(name: &str) -> AttributeBag {
    AttributeBag::new()
        .with("lyr-type", "tiles")
        .with("name", name)
}

#[test]
fn map_takes_in_map_layers_in_registry_order() {
    let ctx = context(MapLib::OpenLayers, Arc::new(QueueScheduler::new()), Scope::new());
    let base = ctx.build_layer(&tiles("base"), true).unwrap();
    ctx.build_layer(&tiles("detached"), false).unwrap();
    let overlay = ctx.build_layer(&tiles("overlay"), true).unwrap();

    let map = ctx
        .build_map(Arc::new(MockHost::default()), &AttributeBag::new())
        .unwrap();
    assert_eq!(map.native().layers(), [base, overlay]);
}

#[test]
fn leaflet_wms_gets_map_projection() {
    let ctx = context(MapLib::Leaflet, Arc::new(QueueScheduler::new()), Scope::new());
    let modern = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "wms")
                .with("lyr-url", "http://example.com/wms")
                .with("version", "1.3.0"),
            true,
        )
        .unwrap();
    let pinned = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "wms")
                .with("lyr-url", "http://example.com/wms")
                .with("srs", "EPSG:4326"),
            true,
        )
        .unwrap();

    let map = ctx
        .build_map(Arc::new(MockHost::default()), &AttributeBag::new())
        .unwrap();
    assert_eq!(map.native().layers(), [pinned.clone(), modern.clone()]);

    let NativeMapKind::Leaflet(leaflet) = map.native().kind() else {
        panic!("expected Leaflet map")
    };
    assert_eq!(leaflet.crs, "EPSG3857");

    let params = |layer: &azimuth::LayerHandle| match &*layer.native() {
        NativeLayer::Leaflet(LeafletLayer::Wms(wms)) => wms.wms_params.clone(),
        other => panic!("unexpected layer {other:?}"),
    };
    assert_eq!(params(&modern)["crs"], OptionValue::from("EPSG:3857"));
    assert!(!params(&modern).contains_key("srs"));
    assert_eq!(params(&pinned)["srs"], OptionValue::from("EPSG:4326"));
}

#[test]
fn unknown_control_leaves_registry_alone() {
    let ctx = context(MapLib::OpenLayers, Arc::new(QueueScheduler::new()), Scope::new());
    ctx.build_layer(&tiles("base"), true).unwrap();

    let result = ctx.build_map(
        Arc::new(MockHost::default()),
        &AttributeBag::new().with("controls", "zoom,hyperdrive"),
    );
    assert!(matches!(result, Err(AzimuthError::UnknownControl { .. })));
    assert_eq!(ctx.registry().len(), 1);
}

#[test]
fn events_are_forwarded_and_notifications_coalesced() {
    let clicks = Arc::new(Mutex::new(vec![]));
    let inner = clicks.clone();
    let scope = Scope::new().with(
        "onClick",
        Callback::new(move |args| {
            inner.lock().push(args.first().cloned().unwrap_or_default());
            OptionValue::Null
        }),
    );
    let scheduler = Arc::new(QueueScheduler::new());
    let ctx = context(MapLib::OpenLayers, scheduler.clone(), scope);
    let host = Arc::new(MockHost::default());

    let map = ctx
        .build_map(
            host.clone(),
            &AttributeBag::new().with("map-click", "onClick($event)"),
        )
        .unwrap();

    for x in [1, 2, 3] {
        let mut properties = OptionMap::new();
        properties.insert("type".into(), "click".into());
        properties.insert("x".into(), x.into());
        map.native().fire(&NativeEvent::new("click", properties));
    }

    assert_eq!(host.events.lock().len(), 3);
    assert_eq!(clicks.lock().len(), 3);
    let first = clicks.lock()[0].clone();
    let payload = first.as_object().expect("event payload");
    assert_eq!(payload["evtType"], OptionValue::from("click"));
    assert_eq!(payload["x"], OptionValue::Number(1.0));
    assert!(!payload.contains_key("type"));

    assert_eq!(host.notifications(), 0);
    assert_eq!(scheduler.run_pending(), 1);
    assert_eq!(host.notifications(), 1);
}

#[test]
fn destroy_clears_registry_once() {
    let scheduler = Arc::new(QueueScheduler::new());
    let ctx = context(MapLib::OpenLayers, scheduler, Scope::new());
    ctx.build_layer(&tiles("base"), true).unwrap();
    ctx.build_layer(&tiles("detached"), false).unwrap();

    let map = ctx
        .build_map(
            Arc::new(MockHost::default()),
            &AttributeBag::new().with("map-moveend", "moved"),
        )
        .unwrap();
    assert_eq!(map.native().listener_count("moveend"), 1);

    assert!(map.destroy());
    assert!(ctx.registry().is_empty());
    assert!(map.native().is_destroyed());
    assert_eq!(map.native().listener_count("moveend"), 0);

    ctx.build_layer(&tiles("next"), true).unwrap();
    assert!(!map.destroy());
    assert_eq!(ctx.registry().len(), 1);
}

#[tokio::test]
async fn data_arriving_after_destroy_lands_on_orphaned_layer() {
    init_logger();
    let gate = Arc::new(Notify::new());
    let ctx = MapContext::builder()
        .with_backend(MapLib::Leaflet)
        .with_fetcher(GatedFetcher::new(gate.clone(), MockFetcher::serving(POINTS)))
        .with_scheduler(Arc::new(QueueScheduler::new()))
        .build();

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    ctx.registry().on(RegistryEvent::DATA, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let layer = ctx
        .build_layer(
            &AttributeBag::new()
                .with("lyr-type", "geojson")
                .with("lyr-url", "http://example.com/points.json"),
            true,
        )
        .unwrap();
    let map = ctx
        .build_map(Arc::new(MockHost::default()), &AttributeBag::new())
        .unwrap();
    assert_eq!(map.native().layers(), [layer.clone()]);
    assert_eq!(layer.data_state(), DataState::Pending);

    assert!(map.destroy());
    assert!(ctx.registry().is_empty());

    gate.notify_one();
    assert_eq!(layer.data_ready().await, DataState::Ready);
    match &*layer.native() {
        NativeLayer::Leaflet(LeafletLayer::GeoJson(geojson)) => {
            assert_eq!(geojson.features.len(), 2)
        }
        other => panic!("unexpected layer {other:?}"),
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert!(!ctx.registry().contains(&layer));
}
