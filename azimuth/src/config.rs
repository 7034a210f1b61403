//! Configuration defaults.
//!
//! Defaults can be loaded from the same JSON shape the markup layer uses:
//!
//! ```json
//! { "defaults": { "CENTER": "38,-99", "ZOOM": 5, "CRS": "3857", "TILE_URL": "..." } }
//! ```
//!
//! Every key is optional; missing keys take the values of [`Defaults::default`].

use serde::Deserialize;
use thiserror::Error;

use crate::value::{OptionMap, OptionValue};

/// Error reading configuration defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON or has a wrong shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The default center is not a pair of numbers.
    #[error("invalid default center `{0}`")]
    InvalidCenter(String),
}

/// Marker icon geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IconDims {
    /// Height.
    #[serde(rename = "H")]
    pub height: f64,
    /// Width.
    #[serde(rename = "W")]
    pub width: f64,
}

/// Default marker icon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkerDefaults {
    /// Icon image URL.
    #[serde(rename = "ICON")]
    pub icon: String,
    /// Icon size.
    #[serde(rename = "DIMS")]
    pub dims: IconDims,
}

/// Process-wide defaults read by layer and map builders.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Defaults {
    /// Default center as `"latitude,longitude"`.
    pub center: String,
    /// Default zoom level.
    pub zoom: f64,
    /// EPSG code of the map projection.
    pub crs: String,
    /// EPSG code of the display projection.
    pub disp_crs: String,
    /// Full identifier of the source reference system of raw coordinates.
    pub srs: String,
    /// Comma separated OpenLayers control names.
    pub ol_controls: String,
    /// Comma separated Leaflet control names.
    pub leaflet_controls: String,
    /// Marker icon defaults.
    pub marker: MarkerDefaults,
    /// Per-control option overrides.
    #[serde(deserialize_with = "deserialize_options")]
    pub ol_ctrl_opts: OptionMap,
    /// Tile URL template with `${s}`, `${z}`, `${x}` and `${y}` placeholders.
    pub tile_url: String,
    /// Subdomains substituted for `${s}`.
    #[serde(deserialize_with = "deserialize_subdomains")]
    pub subdomains: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            center: "38,-99".into(),
            zoom: 5.0,
            crs: "3857".into(),
            disp_crs: "4326".into(),
            srs: "EPSG:4326".into(),
            ol_controls: "zoom,navigation,attribution".into(),
            leaflet_controls: "zoom,attribution".into(),
            marker: MarkerDefaults {
                icon: "http://www.openlayers.org/dev/img/marker.png".into(),
                dims: IconDims {
                    height: 25.0,
                    width: 21.0,
                },
            },
            ol_ctrl_opts: OptionMap::new(),
            tile_url: "http://otile${s}.mqcdn.com/tiles/1.0.0/map/${z}/${x}/${y}.png".into(),
            subdomains: ["1", "2", "3", "4"].map(String::from).to_vec(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    defaults: Defaults,
}

impl Defaults {
    /// Reads defaults from a `{ "defaults": { ... } }` JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_json::from_str(json)?;
        document.defaults.default_center()?;
        Ok(document.defaults)
    }

    /// Map projection identifier, e.g. `EPSG:3857`.
    pub fn map_projection(&self) -> String {
        format!("EPSG:{}", self.crs)
    }

    /// Display projection identifier, e.g. `EPSG:4326`.
    pub fn display_projection(&self) -> String {
        format!("EPSG:{}", self.disp_crs)
    }

    /// Default center as `[longitude, latitude]`.
    ///
    /// The configured value is written latitude first, so the axes are swapped here.
    pub fn default_center(&self) -> Result<[f64; 2], ConfigError> {
        let parts = self
            .center
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::InvalidCenter(self.center.clone()))?;

        match parts.as_slice() {
            [lat, lon] => Ok([*lon, *lat]),
            _ => Err(ConfigError::InvalidCenter(self.center.clone())),
        }
    }
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<OptionMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = serde_json::Map::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .map(|(key, value)| (key, OptionValue::from(value)))
        .collect())
}

fn deserialize_subdomains<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subdomain {
        Number(i64),
        Text(String),
    }

    let items = Vec::<Subdomain>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .map(|item| match item {
            Subdomain::Number(n) => n.to_string(),
            Subdomain::Text(s) => s,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_center_is_reversed() {
        let defaults = Defaults::default();
        assert_eq!(defaults.default_center().unwrap(), [-99.0, 38.0]);
    }

    #[test]
    fn parses_partial_document() {
        let defaults = Defaults::from_json(
            r#"{"defaults": {"ZOOM": 3, "SUBDOMAINS": [1, "b"], "MARKER": {"ICON": "pin.png", "DIMS": {"H": 10, "W": 8}}}}"#,
        )
        .unwrap();

        assert_eq!(defaults.zoom, 3.0);
        assert_eq!(defaults.subdomains, vec!["1", "b"]);
        assert_eq!(defaults.marker.icon, "pin.png");
        assert_eq!(defaults.marker.dims.width, 8.0);
        assert_eq!(defaults.crs, "3857");
    }

    #[test]
    fn rejects_bad_center() {
        let result = Defaults::from_json(r#"{"defaults": {"CENTER": "north"}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidCenter(_))));
    }

    #[test]
    fn control_options_become_option_values() {
        let defaults =
            Defaults::from_json(r#"{"defaults": {"OL_CTRL_OPTS": {"zoom": {"slider": true}}}}"#)
                .unwrap();
        let zoom = defaults.ol_ctrl_opts["zoom"].as_object().unwrap();
        assert_eq!(zoom["slider"], OptionValue::Bool(true));
    }
}
