// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use rampart_store::GeoPoint;

/// Earth radius used by Redis for geo distance, in metres.
const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

const MAX_LATITUDE: f64 = 85.051_128_78;

pub(crate) fn is_valid(point: GeoPoint) -> bool {
    (-180.0..=180.0).contains(&point.longitude) && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&point.latitude)
}

/// Great-circle distance between two points in metres (haversine).
pub(crate) fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (b.longitude - a.longitude).to_radians() / 2.0;

    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
