//! Geographic bounding box and its edge-driven expansion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::KM_PER_DEGREE;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lng: f64,
    pub max_lng: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    /// Square box of `radius_km` on each side of the centre, using 1° ≈ 111 km on both axes.
    #[must_use]
    pub fn around(center_lng: f64, center_lat: f64, radius_km: f64) -> Self {
        let delta = radius_km / KM_PER_DEGREE;
        Self {
            min_lng: center_lng - delta,
            max_lng: center_lng + delta,
            min_lat: center_lat - delta,
            max_lat: center_lat + delta,
        }
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.min_lng <= self.max_lng && self.min_lat <= self.max_lat
    }

    #[must_use]
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        (self.min_lng..=self.max_lng).contains(&lng) && (self.min_lat..=self.max_lat).contains(&lat)
    }

    /// Which edges `(lng, lat)` is within `threshold_deg` of (or beyond).
    #[must_use]
    pub fn edges_near(&self, lng: f64, lat: f64, threshold_deg: f64) -> Directions {
        Directions {
            west: lng < self.min_lng + threshold_deg,
            east: lng > self.max_lng - threshold_deg,
            south: lat < self.min_lat + threshold_deg,
            north: lat > self.max_lat - threshold_deg,
        }
    }

    /// Moves each flagged edge outward by `step_deg`. Unflagged edges stay put,
    /// so the box only ever grows.
    #[must_use]
    pub fn expanded(&self, directions: Directions, step_deg: f64) -> Self {
        let step = step_deg.abs();
        let mut next = *self;
        if directions.west {
            next.min_lng -= step;
        }
        if directions.east {
            next.max_lng += step;
        }
        if directions.south {
            next.min_lat -= step;
        }
        if directions.north {
            next.max_lat += step;
        }
        next
    }
}

/// Cardinal directions a grid needs to grow toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directions {
    pub west: bool,
    pub east: bool,
    pub south: bool,
    pub north: bool,
}

impl Directions {
    #[must_use]
    pub fn any(&self) -> bool {
        self.west || self.east || self.south || self.north
    }
}

impl fmt::Display for Directions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.west, "west"),
            (self.east, "east"),
            (self.south, "south"),
            (self.north, "north"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}
