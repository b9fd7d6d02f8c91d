//! Hexagonal visitation grid: geometry, live grid management, and the
//! GeoJSON layers the map renders from it.

pub mod bounds;
pub mod geojson;
pub mod geometry;
pub mod manager;
pub mod path;

pub use bounds::{Directions, GeoBounds};
pub use geojson::{CellProperties, Feature, FeatureCollection, Geometry, NoProperties};
pub use geometry::{
    cell_contains, generate_grid, HexCell, HexId, Projection, VisitationGrid, HEX_EDGE_KM,
    KM_PER_DEGREE,
};
pub use manager::{FixOutcome, GridSettings, VisitationGridManager, VisitedRetention};
pub use path::PathTrack;
