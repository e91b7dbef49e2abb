//! # Roadnet
//!
//! Builds routable road-network models from OpenStreetMap extracts and
//! GeoTIFF terrain rasters.
//!
//! Vector sources are consolidated into a deduplicated vertex table and an
//! edge table that keeps each way's full point sequence. Raster tiles are
//! mosaicked with a configurable overlap policy and queried with bilinear
//! interpolation to attach an elevation to every vertex.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use roadnet::Model;
//!
//! fn main() -> roadnet::Result<()> {
//!     let mut model = Model::new("belgium");
//!     model.add("belgium.osm.pbf")?;
//!     model.add("dem_n50_e004.tif")?;
//!     model.build();
//!     model.dump();
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod geo;
pub mod graph;
pub mod model;
pub mod mosaic;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use geo::Extent;
pub use graph::{Edge, Graph, GraphBuilder, Vertex};
pub use model::{Model, ModelSummary};
pub use mosaic::{MosaicBuilder, OverlapPolicy, RasterMosaic};
pub use raster::RasterTile;
pub use vector::VectorData;
