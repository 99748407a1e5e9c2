// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Plain data carried across the [`RemoteStore`](crate::RemoteStore) boundary.

/// A member of an ordered set together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    /// The member value.
    pub member: String,
    /// The score the member is ordered by.
    pub score: f64,
}

impl ScoredMember {
    /// Creates a new scored member.
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// A position on the globe in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees, `-180.0..=180.0`.
    pub longitude: f64,
    /// Latitude in degrees, `-85.05112878..=85.05112878` for Redis compatibility.
    pub latitude: f64,
}

impl GeoPoint {
    /// Creates a new point from longitude and latitude.
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }
}

/// A geo search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMatch {
    /// The member that matched.
    pub member: String,
    /// Distance from the search center in metres.
    pub distance_m: f64,
}

impl GeoMatch {
    /// Creates a new geo match.
    pub fn new(member: impl Into<String>, distance_m: f64) -> Self {
        Self {
            member: member.into(),
            distance_m,
        }
    }
}
