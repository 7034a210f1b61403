//! Coordinate reference identifiers and the transforms the builders need.
//!
//! Only geographic coordinates (EPSG:4326) and spherical mercator (EPSG:3857 and its aliases) are
//! transformed, through the web mercator projection of `galileo-types`. Any other pair of
//! projections leaves coordinates unchanged; deciding whether that is geographically meaningful is
//! up to the backend.

use std::fmt;

use galileo_types::cartesian::{CartesianPoint2d, Point2};
use galileo_types::geo::impls::GeoPoint2d;
use galileo_types::geo::{Crs, GeoPoint, NewGeoPoint, Projection as _};

const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

const MERCATOR_CODES: &[&str] = &["3857", "900913", "102100", "102113", "3785"];

/// A coordinate reference system identifier such as `EPSG:3857`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Projection {
    code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Geographic,
    SphericalMercator,
    Other,
}

impl Projection {
    /// Creates a projection from an identifier. A bare number is read as an EPSG code.
    pub fn new(identifier: &str) -> Self {
        let identifier = identifier.trim();
        let code = if identifier.chars().all(|c| c.is_ascii_digit()) && !identifier.is_empty() {
            format!("EPSG:{identifier}")
        } else {
            identifier.to_string()
        };
        Self { code }
    }

    /// Geographic latitude/longitude.
    pub fn wgs84() -> Self {
        Self::new("EPSG:4326")
    }

    /// Full identifier.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Identifier without the authority separator, e.g. `EPSG3857`.
    pub fn compact_code(&self) -> String {
        self.code.replace(':', "")
    }

    /// Numeric part of the identifier, if any.
    pub fn number(&self) -> Option<&str> {
        self.code.rsplit(':').next().filter(|n| !n.is_empty())
    }

    fn family(&self) -> Family {
        match self.number() {
            Some("4326") | Some("CRS84") => Family::Geographic,
            Some(n) if MERCATOR_CODES.contains(&n) => Family::SphericalMercator,
            _ => Family::Other,
        }
    }

    /// Whether both identifiers describe the same coordinate space.
    pub fn is_equivalent(&self, other: &Projection) -> bool {
        self == other || (self.family() != Family::Other && self.family() == other.family())
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// A point given as longitude/latitude or easting/northing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    /// Longitude or easting.
    pub lon: f64,
    /// Latitude or northing.
    pub lat: f64,
}

impl LonLat {
    /// Creates a point.
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Transforms the point from `source` into `dest`.
    pub fn transform(self, source: &Projection, dest: &Projection) -> Self {
        let transformed = match (source.family(), dest.family()) {
            _ if source.is_equivalent(dest) => return self,
            (Family::Geographic, Family::SphericalMercator) => self.to_mercator(),
            (Family::SphericalMercator, Family::Geographic) => self.to_geographic(),
            _ => None,
        };

        transformed.unwrap_or_else(|| {
            log::debug!("No transform of {self:?} from {source} to {dest}, keeping coordinates");
            self
        })
    }

    fn to_mercator(self) -> Option<Self> {
        let lat = self.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let projection = Crs::EPSG3857.get_projection::<GeoPoint2d, Point2>()?;
        let point = projection.project(&GeoPoint2d::latlon(lat, self.lon))?;
        Some(Self::new(point.x(), point.y()))
    }

    fn to_geographic(self) -> Option<Self> {
        let projection = Crs::EPSG3857.get_projection::<GeoPoint2d, Point2>()?;
        let point = projection.unproject(&Point2::new(self.lon, self.lat))?;
        Some(Self::new(point.lon(), point.lat()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn bare_codes_get_authority() {
        assert_eq!(Projection::new("3857").code(), "EPSG:3857");
        assert_eq!(Projection::new("EPSG:900913").number(), Some("900913"));
        assert_eq!(Projection::new("EPSG:3857").compact_code(), "EPSG3857");
    }

    #[test]
    fn geographic_to_mercator() {
        let point = LonLat::new(20.0, 10.0)
            .transform(&Projection::wgs84(), &Projection::new("EPSG:3857"));
        assert_relative_eq!(point.lon, 2_226_389.815_9, epsilon = 1e-3);
        assert_relative_eq!(point.lat, 1_118_889.974_9, epsilon = 1e-3);
    }

    #[test]
    fn round_trip_through_alias() {
        let source = LonLat::new(-99.0, 38.0);
        let mercator = source.transform(&Projection::wgs84(), &Projection::new("EPSG:900913"));
        let back = mercator.transform(&Projection::new("EPSG:102113"), &Projection::wgs84());
        assert_relative_eq!(back.lon, source.lon, epsilon = 1e-9);
        assert_relative_eq!(back.lat, source.lat, epsilon = 1e-9);
    }

    #[test]
    fn mercator_clamps_polar_latitudes() {
        let mercator = Projection::new("EPSG:3857");
        let pole = LonLat::new(0.0, 90.0).transform(&Projection::wgs84(), &mercator);
        let edge = LonLat::new(0.0, MAX_LATITUDE).transform(&Projection::wgs84(), &mercator);
        assert!(pole.lat.is_finite());
        assert_relative_eq!(pole.lat, edge.lat, epsilon = 1e-6);
        assert_relative_eq!(edge.lat, 20_037_508.342_789, epsilon = 1e-3);
    }

    #[test]
    fn unknown_pairs_pass_through() {
        let point = LonLat::new(1.0, 2.0);
        assert_eq!(
            point.transform(&Projection::wgs84(), &Projection::new("EPSG:2784")),
            point
        );
    }
}
