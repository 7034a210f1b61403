#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use azimuth::{DataFetcher, FetchError, FetchRequest, HostElement, MapEvent};
use geojson::GeoJson;
use parking_lot::Mutex;
use tokio::sync::Notify;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fetcher serving a fixed document and recording requests.
pub struct MockFetcher {
    response: Result<GeoJson, FetchError>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    pub fn serving(json: &str) -> Self {
        Self {
            response: Ok(json.parse().expect("valid GeoJSON fixture")),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            response: Err(FetchError::Status {
                url: "http://example.com".into(),
                status,
            }),
            requests: Mutex::new(vec![]),
        }
    }
}

#[async_trait::async_trait]
impl DataFetcher for MockFetcher {
    async fn fetch_geojson(&self, request: &FetchRequest) -> Result<GeoJson, FetchError> {
        self.requests.lock().push(request.clone());
        self.response.clone()
    }
}

/// Fetcher that holds every response until the gate is opened.
pub struct GatedFetcher {
    gate: Arc<Notify>,
    inner: MockFetcher,
}

impl GatedFetcher {
    pub fn new(gate: Arc<Notify>, inner: MockFetcher) -> Self {
        Self { gate, inner }
    }
}

#[async_trait::async_trait]
impl DataFetcher for GatedFetcher {
    async fn fetch_geojson(&self, request: &FetchRequest) -> Result<GeoJson, FetchError> {
        self.gate.notified().await;
        self.inner.fetch_geojson(request).await
    }
}

#[derive(Default)]
pub struct MockHost {
    pub events: Mutex<Vec<MapEvent>>,
    pub notifications: AtomicUsize,
}

impl MockHost {
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl HostElement for MockHost {
    fn id(&self) -> &str {
        "map"
    }

    fn trigger(&self, event: &MapEvent) {
        self.events.lock().push(event.clone());
    }

    fn notify(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}

pub const POINTS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [20.0, 10.0]}, "properties": {"name": "a"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [21.0, 11.0]}, "properties": {"name": "b"}}
    ]
}"#;
