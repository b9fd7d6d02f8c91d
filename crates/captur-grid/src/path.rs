//! Travelled path rendered as a single line.

use captur_core::LocationFix;

use crate::geojson::{Feature, Geometry, NoProperties};

/// Ordered `[lng, lat]` positions: history first, then live fixes as they arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTrack {
    coordinates: Vec<[f64; 2]>,
}

impl PathTrack {
    #[must_use]
    pub fn from_history(history: &[LocationFix]) -> Self {
        Self {
            coordinates: history.iter().map(|f| [f.longitude, f.latitude]).collect(),
        }
    }

    pub fn push(&mut self, fix: &LocationFix) {
        self.coordinates.push([fix.longitude, fix.latitude]);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    #[must_use]
    pub fn coordinates(&self) -> &[[f64; 2]] {
        &self.coordinates
    }

    #[must_use]
    pub fn to_geojson(&self) -> Feature<NoProperties> {
        Feature::new(
            Geometry::LineString {
                coordinates: self.coordinates.clone(),
            },
            NoProperties::default(),
        )
    }
}
