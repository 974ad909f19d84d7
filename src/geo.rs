use geo::{coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{BusConnectError, BusConnectResult};
use crate::routes::Route;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Half-width of the candidate box used before exact distances are computed.
/// Independent of the requested radius, so radii beyond ~5.5km can miss routes.
pub const SEARCH_BOX_DEGREES: f64 = 0.05;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> BusConnectResult<Self> {
        let coordinate = Coordinate {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    pub fn validate(&self) -> BusConnectResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(BusConnectError::invalid(format!(
                "Latitude must be between -90 and 90, got {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(BusConnectError::invalid(format!(
                "Longitude must be between -180 and 180, got {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Great-circle distance in kilometres
pub fn haversine_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// The fixed candidate box around `center`. x is longitude, y is latitude.
pub fn get_search_box(center: &Coordinate) -> Rect {
    Rect::new(
        coord! { x: center.longitude - SEARCH_BOX_DEGREES, y: center.latitude - SEARCH_BOX_DEGREES },
        coord! { x: center.longitude + SEARCH_BOX_DEGREES, y: center.latitude + SEARCH_BOX_DEGREES },
    )
}

/// Inclusive on all edges
pub fn in_box(bounds: &Rect, c: &Coordinate) -> bool {
    let (min, max) = (bounds.min(), bounds.max());
    c.longitude >= min.x && c.longitude <= max.x && c.latitude >= min.y && c.latitude <= max.y
}

impl Route {
    /// Start, end, then waypoints in order
    fn points(&self) -> impl Iterator<Item = &Coordinate> {
        [&self.start_location, &self.end_location]
            .into_iter()
            .chain(self.waypoints.iter().map(|w| &w.position))
    }
}

pub fn validate_radius(radius_km: f64) -> BusConnectResult<()> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(BusConnectError::invalid(format!(
            "Radius must be a positive number of kilometres, got {}",
            radius_km
        )));
    }
    Ok(())
}

/// Routes with a start, end or waypoint within `radius_km` of `center`.
///
/// Two phases: a cheap box test on every point, then Haversine distances on
/// the survivors, stopping at the first point in range. Input order is kept.
pub fn find_nearby_routes(
    center: &Coordinate,
    radius_km: f64,
    routes: impl IntoIterator<Item = Route>,
) -> BusConnectResult<Vec<Route>> {
    center.validate()?;
    validate_radius(radius_km)?;

    let bounds = get_search_box(center);

    let nearby = routes
        .into_iter()
        .filter(|route| route.points().any(|p| in_box(&bounds, p)))
        .filter(|route| route.points().any(|p| haversine_km(center, p) <= radius_km))
        .collect();

    Ok(nearby)
}
