//! Live visitation grid: owns the current generation, its bounds, and the
//! set of cells the user has entered.
//!
//! The manager is a plain state machine. [`VisitationGridManager::process_fix`]
//! is the only mutating path for live fixes and takes `&mut self`; the overlay
//! query takes `&self`, so a reader can never observe a half-replaced grid.
//! Expansion builds the next generation completely before swapping it in.

use std::collections::HashSet;
use std::sync::Arc;

use captur_core::LocationFix;

use crate::bounds::{Directions, GeoBounds};
use crate::geojson::{CellProperties, Feature, FeatureCollection, Geometry};
use crate::geometry::{HexId, Projection, VisitationGrid, HEX_EDGE_KM, KM_PER_DEGREE};

/// What happens to the visited set when the grid is regenerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisitedRetention {
    /// Keep visited cells; ids are lattice coordinates and survive regeneration.
    #[default]
    Retain,
    /// Forget everything on each expansion.
    ResetOnExpansion,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub edge_km: f64,
    pub initial_radius_km: f64,
    /// Distance from an edge, in degrees, that triggers growth toward it.
    pub expansion_threshold_deg: f64,
    pub expansion_step_km: f64,
    pub retention: VisitedRetention,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            edge_km: HEX_EDGE_KM,
            initial_radius_km: 10.0,
            expansion_threshold_deg: 0.01,
            expansion_step_km: 1.0,
            retention: VisitedRetention::Retain,
        }
    }
}

impl GridSettings {
    #[must_use]
    pub fn expansion_step_deg(&self) -> f64 {
        self.expansion_step_km / KM_PER_DEGREE
    }

    /// Smallest starting radius whose grid does not already sit inside the
    /// expansion margin around its own centre.
    #[must_use]
    pub fn min_radius_km(&self) -> f64 {
        self.expansion_threshold_deg * KM_PER_DEGREE
    }
}

/// Result of feeding one fix to the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixOutcome {
    /// Edges the grid grew toward, if this fix triggered an expansion.
    pub expanded: Option<Directions>,
    /// Cell the fix landed in, if any.
    pub cell: Option<HexId>,
    /// `true` exactly once per cell per visited-set lifetime.
    pub newly_visited: bool,
}

#[derive(Debug, Default)]
pub struct VisitationGridManager {
    settings: GridSettings,
    grid: Option<Arc<VisitationGrid>>,
    visited: HashSet<HexId>,
    generation: u64,
}

impl VisitationGridManager {
    #[must_use]
    pub fn new(settings: GridSettings) -> Self {
        Self {
            settings,
            grid: None,
            visited: HashSet::new(),
            generation: 0,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.grid.is_some()
    }

    /// Builds the starting grid around the first fix. Returns `false` and does
    /// nothing when a grid already exists.
    pub fn initialize(&mut self, first_fix: &LocationFix) -> bool {
        if self.grid.is_some() {
            return false;
        }
        let (lng, lat) = (first_fix.longitude, first_fix.latitude);
        let projection = Projection::anchored_at(lng, lat, self.settings.edge_km);
        let bounds = GeoBounds::around(lng, lat, self.settings.initial_radius_km);
        let grid = VisitationGrid::generate(bounds, projection);
        tracing::info!(
            lng,
            lat,
            radius_km = self.settings.initial_radius_km,
            cells = grid.len(),
            "grid initialized"
        );
        self.grid = Some(Arc::new(grid));
        self.generation = 1;
        true
    }

    /// Marks the cell of every historical fix as visited. Returns how many
    /// cells were added. Fixes outside the grid are skipped.
    pub fn seed_from_history(&mut self, fixes: &[LocationFix]) -> usize {
        let Some(grid) = self.grid.clone() else {
            tracing::warn!(
                fixes = fixes.len(),
                "seed_from_history called before initialize; ignoring"
            );
            return 0;
        };
        let before = self.visited.len();
        for fix in fixes {
            if let Some(cell) = grid.cell_at(fix.longitude, fix.latitude) {
                self.visited.insert(cell.id);
            }
        }
        let added = self.visited.len() - before;
        tracing::info!(fixes = fixes.len(), added, "seeded visited cells from history");
        added
    }

    /// Expands toward any edge the fix is close to, then records the cell it
    /// falls in. A fix that lands in no cell is ignored.
    pub fn process_fix(&mut self, fix: &LocationFix) -> FixOutcome {
        let Some(mut grid) = self.grid.clone() else {
            tracing::debug!("fix received before grid initialization; ignoring");
            return FixOutcome::default();
        };
        let (lng, lat) = (fix.longitude, fix.latitude);

        let mut outcome = FixOutcome::default();
        let bounds = grid.bounds();
        let directions = bounds.edges_near(lng, lat, self.settings.expansion_threshold_deg);
        if directions.any() {
            grid = self.expand(&grid, directions);
            outcome.expanded = Some(directions);
        }

        let Some(cell) = grid.cell_at(lng, lat) else {
            tracing::debug!(lng, lat, "fix outside every cell; ignoring");
            return outcome;
        };
        outcome.cell = Some(cell.id);
        outcome.newly_visited = self.visited.insert(cell.id);
        if outcome.newly_visited {
            tracing::debug!(cell = %cell.id, total = self.visited.len(), "new cell visited");
        }
        outcome
    }

    fn expand(&mut self, current: &VisitationGrid, directions: Directions) -> Arc<VisitationGrid> {
        let bounds = current
            .bounds()
            .expanded(directions, self.settings.expansion_step_deg());
        let next = Arc::new(VisitationGrid::generate(bounds, *current.projection()));
        self.grid = Some(Arc::clone(&next));
        self.generation += 1;

        tracing::info!(
            %directions,
            generation = self.generation,
            cells = next.len(),
            "grid expanded"
        );
        if self.settings.retention == VisitedRetention::ResetOnExpansion && !self.visited.is_empty()
        {
            tracing::warn!(
                forgotten = self.visited.len(),
                "visited cells reset on grid expansion"
            );
            self.visited.clear();
        }
        next
    }

    /// Current generation; `None` until initialized.
    #[must_use]
    pub fn grid(&self) -> Option<Arc<VisitationGrid>> {
        self.grid.clone()
    }

    #[must_use]
    pub fn bounds(&self) -> Option<GeoBounds> {
        self.grid.as_ref().map(|g| g.bounds())
    }

    /// Number of grid generations built so far (0 before initialization).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_visited(&self, id: HexId) -> bool {
        self.visited.contains(&id)
    }

    #[must_use]
    pub fn visited(&self) -> &HashSet<HexId> {
        &self.visited
    }

    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Every cell of the current generation with its `visited` flag.
    #[must_use]
    pub fn overlay_geojson(&self) -> FeatureCollection<CellProperties> {
        let Some(grid) = &self.grid else {
            return FeatureCollection::empty();
        };
        let features = grid
            .cells()
            .iter()
            .map(|cell| {
                Feature::new(
                    Geometry::Polygon {
                        coordinates: vec![cell.ring.clone()],
                    },
                    CellProperties {
                        id: cell.id.to_string(),
                        index: cell.index,
                        visited: self.visited.contains(&cell.id),
                    },
                )
            })
            .collect();
        FeatureCollection::new(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lng: f64) -> LocationFix {
        LocationFix::new(lat, lng).unwrap()
    }

    fn small_settings() -> GridSettings {
        GridSettings {
            initial_radius_km: 2.0,
            ..GridSettings::default()
        }
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut manager = VisitationGridManager::new(small_settings());
        assert!(manager.initialize(&fix(40.0, -3.0)));
        let bounds = manager.bounds().unwrap();
        assert!(!manager.initialize(&fix(41.0, -4.0)));
        assert_eq!(manager.bounds().unwrap(), bounds);
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn uninitialized_manager_ignores_fixes() {
        let mut manager = VisitationGridManager::new(small_settings());
        assert_eq!(manager.process_fix(&fix(40.0, -3.0)), FixOutcome::default());
        assert_eq!(manager.seed_from_history(&[fix(40.0, -3.0)]), 0);
        assert!(manager.overlay_geojson().features.is_empty());
    }

    #[test]
    fn same_cell_is_new_only_once() {
        let mut manager = VisitationGridManager::new(small_settings());
        manager.initialize(&fix(40.0, -3.0));
        let first = manager.process_fix(&fix(40.0, -3.0));
        let second = manager.process_fix(&fix(40.0, -3.0));
        assert!(first.newly_visited);
        assert!(!second.newly_visited);
        assert_eq!(first.cell, second.cell);
        assert_eq!(manager.visited_count(), 1);
    }

    #[test]
    fn overlay_marks_visited_cells_only() {
        let mut manager = VisitationGridManager::new(small_settings());
        manager.initialize(&fix(40.0, -3.0));
        let cell = manager.process_fix(&fix(40.0, -3.0)).cell.unwrap();

        let overlay = manager.overlay_geojson();
        let visited: Vec<_> = overlay
            .features
            .iter()
            .filter(|f| f.properties.visited)
            .collect();
        assert_eq!(visited.len(), 1);
        assert_eq!(visited[0].properties.id, cell.to_string());
        assert_eq!(overlay.features.len(), manager.grid().unwrap().len());
    }

    #[test]
    fn reset_policy_forgets_on_expansion() {
        let mut manager = VisitationGridManager::new(GridSettings {
            retention: VisitedRetention::ResetOnExpansion,
            ..small_settings()
        });
        manager.initialize(&fix(40.0, -3.0));
        manager.process_fix(&fix(40.0, -3.0));
        assert_eq!(manager.visited_count(), 1);

        let east_edge = manager.bounds().unwrap().max_lng - 0.001;
        let outcome = manager.process_fix(&fix(40.0, east_edge));
        assert!(outcome.expanded.is_some());
        // Only the cell entered after the reset remains.
        assert_eq!(manager.visited_count(), 1);
        assert!(outcome.newly_visited);
    }

    #[test]
    fn retain_policy_keeps_cells_across_expansion() {
        let mut manager = VisitationGridManager::new(small_settings());
        manager.initialize(&fix(40.0, -3.0));
        let home = manager.process_fix(&fix(40.0, -3.0)).cell.unwrap();

        let east_edge = manager.bounds().unwrap().max_lng - 0.001;
        manager.process_fix(&fix(40.0, east_edge));
        assert_eq!(manager.generation(), 2);
        assert!(manager.is_visited(home));
        assert_eq!(manager.visited_count(), 2);
        // Revisiting home after regeneration does not count as new.
        assert!(!manager.process_fix(&fix(40.0, -3.0)).newly_visited);
    }
}
