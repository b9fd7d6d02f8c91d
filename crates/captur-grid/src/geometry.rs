//! Hexagonal tessellation over a geographic bounding box.
//!
//! Geometry is computed on a flat-earth approximation (1° latitude ≈ 111 km,
//! longitude scaled by the cosine of the anchor latitude), which holds well
//! enough across a metro area. Hexagons are flat-topped with a fixed edge
//! length and are addressed by axial lattice coordinates relative to a
//! [`Projection`] anchor, so a cell keeps the same [`HexId`] across every grid
//! generation that shares the anchor.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::GeoBounds;

/// Kilometres per degree of latitude (and of longitude at the equator).
pub const KM_PER_DEGREE: f64 = 111.0;

/// Default hexagon edge length: 100 m.
pub const HEX_EDGE_KM: f64 = 0.1;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Axial coordinate of a hexagon on the anchored lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexId {
    pub q: i64,
    pub r: i64,
}

impl HexId {
    #[must_use]
    pub fn new(q: i64, r: i64) -> Self {
        Self { q, r }
    }

    /// The six lattice neighbours, counter-clockwise starting east.
    #[must_use]
    pub fn neighbors(self) -> [HexId; 6] {
        const OFFSETS: [(i64, i64); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];
        OFFSETS.map(|(dq, dr)| HexId::new(self.q + dq, self.r + dr))
    }
}

impl fmt::Display for HexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.q, self.r)
    }
}

/// Maps lng/lat degrees to a local planar frame in kilometres and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    origin_lng: f64,
    origin_lat: f64,
    km_per_deg_lng: f64,
    edge_km: f64,
}

impl Projection {
    /// Anchors the lattice at `(lng, lat)` with the given hexagon edge length.
    #[must_use]
    pub fn anchored_at(lng: f64, lat: f64, edge_km: f64) -> Self {
        // Keep the longitude scale away from zero near the poles.
        let cos = lat.to_radians().cos().max(0.01);
        Self {
            origin_lng: lng,
            origin_lat: lat,
            km_per_deg_lng: KM_PER_DEGREE * cos,
            edge_km,
        }
    }

    #[must_use]
    pub fn edge_km(&self) -> f64 {
        self.edge_km
    }

    #[must_use]
    pub fn to_plane(&self, lng: f64, lat: f64) -> (f64, f64) {
        (
            (lng - self.origin_lng) * self.km_per_deg_lng,
            (lat - self.origin_lat) * KM_PER_DEGREE,
        )
    }

    #[must_use]
    pub fn to_geo(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.origin_lng + x / self.km_per_deg_lng,
            self.origin_lat + y / KM_PER_DEGREE,
        ]
    }

    /// Planar centre of a hexagon.
    #[must_use]
    pub fn center_of(&self, id: HexId) -> (f64, f64) {
        #[allow(clippy::cast_precision_loss)]
        let (q, r) = (id.q as f64, id.r as f64);
        (
            self.edge_km * 1.5 * q,
            self.edge_km * SQRT_3 * (r + q / 2.0),
        )
    }

    /// The hexagon whose interior (or boundary) contains `(lng, lat)`.
    ///
    /// Cube rounding assigns every point to exactly one hexagon, so a point
    /// on a shared edge is never counted twice.
    #[must_use]
    pub fn locate(&self, lng: f64, lat: f64) -> HexId {
        let (x, y) = self.to_plane(lng, lat);
        let q = (2.0 / 3.0 * x) / self.edge_km;
        let r = (-x / 3.0 + SQRT_3 / 3.0 * y) / self.edge_km;
        cube_round(q, r)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cube_round(q: f64, r: f64) -> HexId {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let (dq, dr, ds) = ((rq - q).abs(), (rr - r).abs(), (rs - s).abs());
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    HexId::new(rq as i64, rr as i64)
}

/// One hexagon in a grid generation.
#[derive(Debug, Clone, PartialEq)]
pub struct HexCell {
    pub id: HexId,
    /// Position in the owning grid's cell list. Only meaningful within one generation.
    pub index: usize,
    pub center: [f64; 2],
    /// Closed ring of `[lng, lat]` vertices, counter-clockwise, first == last.
    pub ring: Vec<[f64; 2]>,
}

/// A complete, immutable tessellation of a bounding box.
#[derive(Debug, Clone)]
pub struct VisitationGrid {
    projection: Projection,
    bounds: GeoBounds,
    cells: Vec<HexCell>,
    lookup: HashMap<HexId, usize>,
}

impl VisitationGrid {
    /// Tessellates `bounds` using the lattice described by `projection`.
    ///
    /// Every hexagon whose centre lies within one edge length of the box is
    /// emitted, which guarantees each point inside the box falls in some cell.
    /// Cells are ordered west to east by column, then south to north.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn generate(bounds: GeoBounds, projection: Projection) -> Self {
        debug_assert!(bounds.is_well_formed(), "malformed bounds: {bounds:?}");

        let edge = projection.edge_km;
        let (x0, y0) = projection.to_plane(bounds.min_lng, bounds.min_lat);
        let (x1, y1) = projection.to_plane(bounds.max_lng, bounds.max_lat);
        let (x0, x1, y0, y1) = (x0 - edge, x1 + edge, y0 - edge, y1 + edge);

        let col_step = 1.5 * edge;
        let row_step = SQRT_3 * edge;
        let q_min = (x0 / col_step).ceil() as i64;
        let q_max = (x1 / col_step).floor() as i64;

        let mut cells = Vec::new();
        for q in q_min..=q_max {
            #[allow(clippy::cast_precision_loss)]
            let half_q = q as f64 / 2.0;
            let r_min = (y0 / row_step - half_q).ceil() as i64;
            let r_max = (y1 / row_step - half_q).floor() as i64;
            for r in r_min..=r_max {
                let id = HexId::new(q, r);
                let index = cells.len();
                cells.push(build_cell(&projection, id, index));
            }
        }

        let lookup = cells.iter().map(|c| (c.id, c.index)).collect();
        Self {
            projection,
            bounds,
            cells,
            lookup,
        }
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    #[must_use]
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    #[must_use]
    pub fn cells(&self) -> &[HexCell] {
        &self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: HexId) -> Option<&HexCell> {
        self.lookup.get(&id).map(|&i| &self.cells[i])
    }

    /// The cell a point belongs to, or `None` when it lies outside this generation.
    #[must_use]
    pub fn cell_at(&self, lng: f64, lat: f64) -> Option<&HexCell> {
        self.get(self.projection.locate(lng, lat))
    }
}

fn build_cell(projection: &Projection, id: HexId, index: usize) -> HexCell {
    let (cx, cy) = projection.center_of(id);
    let edge = projection.edge_km;
    let mut ring: Vec<[f64; 2]> = (0..6)
        .map(|i| {
            let angle = f64::from(60 * i).to_radians();
            projection.to_geo(cx + edge * angle.cos(), cy + edge * angle.sin())
        })
        .collect();
    ring.push(ring[0]);
    HexCell {
        id,
        index,
        center: projection.to_geo(cx, cy),
        ring,
    }
}

/// Builds a grid covering `radius_km` around a centre point, anchored at that centre.
///
/// Deterministic: identical arguments always yield identical cells in identical order.
#[must_use]
pub fn generate_grid(center_lng: f64, center_lat: f64, radius_km: f64) -> VisitationGrid {
    let projection = Projection::anchored_at(center_lng, center_lat, HEX_EDGE_KM);
    let bounds = GeoBounds::around(center_lng, center_lat, radius_km);
    VisitationGrid::generate(bounds, projection)
}

/// Even-odd ray casting against the cell's ring.
///
/// Points exactly on an edge may fall either way; callers that need a single
/// owner per point should use [`VisitationGrid::cell_at`].
#[must_use]
pub fn cell_contains(lng: f64, lat: f64, cell: &HexCell) -> bool {
    let ring = &cell.ring;
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > lat) != (yj > lat) && lng < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    const MADRID: (f64, f64) = (-3.703_8, 40.416_8);

    #[test]
    fn grid_is_deterministic() {
        let a = generate_grid(MADRID.0, MADRID.1, 1.0);
        let b = generate_grid(MADRID.0, MADRID.1, 1.0);
        assert_eq!(a.len(), b.len());
        assert_eq!(a.cells(), b.cells());
    }

    #[test]
    fn one_km_grid_has_plausible_cell_count() {
        // The degree box is 2 km tall but only ~1.5 km wide at this latitude,
        // plus a one-edge margin; ~0.026 km² per hexagon.
        let grid = generate_grid(MADRID.0, MADRID.1, 1.0);
        assert!(
            grid.len() > 100 && grid.len() < 200,
            "got {} cells",
            grid.len()
        );
    }

    #[test]
    fn indices_match_positions() {
        let grid = generate_grid(MADRID.0, MADRID.1, 0.5);
        for (i, cell) in grid.cells().iter().enumerate() {
            assert_eq!(cell.index, i);
            assert_eq!(cell.ring.len(), 7);
            assert_eq!(cell.ring.first(), cell.ring.last());
        }
    }

    #[test]
    fn cell_centre_is_inside_its_own_polygon() {
        let grid = generate_grid(MADRID.0, MADRID.1, 0.5);
        for cell in grid.cells() {
            assert!(cell_contains(cell.center[0], cell.center[1], cell));
        }
    }

    #[test]
    fn locate_agrees_with_polygon_test() {
        let grid = generate_grid(MADRID.0, MADRID.1, 0.5);
        let (lng, lat) = (MADRID.0 + 0.000_73, MADRID.1 - 0.000_41);
        let cell = grid.cell_at(lng, lat).expect("point inside grid");
        assert!(cell_contains(lng, lat, cell));
        let owners = grid
            .cells()
            .iter()
            .filter(|c| cell_contains(lng, lat, c))
            .count();
        assert_eq!(owners, 1);
    }

    #[test]
    fn every_point_in_bounds_has_a_cell() {
        let grid = generate_grid(MADRID.0, MADRID.1, 0.5);
        let b = grid.bounds();
        for i in 0..=10 {
            for j in 0..=10 {
                let lng = b.min_lng + (b.max_lng - b.min_lng) * f64::from(i) / 10.0;
                let lat = b.min_lat + (b.max_lat - b.min_lat) * f64::from(j) / 10.0;
                assert!(grid.cell_at(lng, lat).is_some(), "no cell at {lng},{lat}");
            }
        }
    }

    #[test]
    fn ids_are_stable_across_regeneration() {
        let projection = Projection::anchored_at(MADRID.0, MADRID.1, HEX_EDGE_KM);
        let small = VisitationGrid::generate(GeoBounds::around(MADRID.0, MADRID.1, 0.5), projection);
        let mut bigger_bounds = small.bounds();
        bigger_bounds.max_lng += 0.01;
        let bigger = VisitationGrid::generate(bigger_bounds, projection);

        let (lng, lat) = (MADRID.0 + 0.001, MADRID.1 + 0.001);
        let before = small.cell_at(lng, lat).unwrap();
        let after = bigger.cell_at(lng, lat).unwrap();
        assert_eq!(before.id, after.id);
        assert_eq!(before.ring, after.ring);
    }

    #[test]
    fn neighbours_share_an_edge_length_apart() {
        let projection = Projection::anchored_at(0.0, 0.0, HEX_EDGE_KM);
        let (cx, cy) = projection.center_of(HexId::new(0, 0));
        for n in HexId::new(0, 0).neighbors() {
            let (nx, ny) = projection.center_of(n);
            let d = ((nx - cx).powi(2) + (ny - cy).powi(2)).sqrt();
            assert!((d - SQRT_3 * HEX_EDGE_KM).abs() < 1e-9, "distance {d}");
        }
    }

    #[test]
    fn hex_id_display() {
        assert_eq!(HexId::new(-3, 7).to_string(), "-3:7");
    }
}
