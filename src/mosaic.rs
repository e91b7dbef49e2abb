//! Mosaic of elevation tiles presented as one queryable surface.
//!
//! The mosaic is an explicit two-phase state machine: a [`MosaicBuilder`]
//! accumulates tiles in insertion order, then [`MosaicBuilder::finalize`]
//! consumes it and produces an immutable [`RasterMosaic`] carrying an
//! R-tree over tile extents. After finalization the mosaic is read-only and
//! safe to share across threads without locking.

use rayon::prelude::*;
use rstar::{Envelope, PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::Extent;
use crate::raster::RasterTile;

/// How to resolve a point covered by more than one tile.
///
/// `LastWins` (the default) picks the tile added last, so overlapping seams
/// resolve deterministically by source order rather than by averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapPolicy {
    #[default]
    LastWins,
    Max,
    Mean,
}

/// Tile bounding box entry for the R-tree.
#[derive(Debug, Clone)]
struct TileRegion {
    aabb: AABB<[f64; 2]>,
    tile_index: usize,
}

impl RTreeObject for TileRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

// Point lookups (`locate_all_at_point`) need a distance, not just an
// envelope. Containment stays inclusive on the box edges.
impl PointDistance for TileRegion {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.aabb.distance_2(point)
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.aabb.contains_point(point)
    }
}

/// Accumulating phase: tiles added one by one, in order.
#[derive(Debug, Default)]
pub struct MosaicBuilder {
    tiles: Vec<RasterTile>,
    policy: OverlapPolicy,
}

impl MosaicBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: OverlapPolicy) -> Self {
        Self {
            tiles: Vec::new(),
            policy,
        }
    }

    /// Append a tile. Tiles may be disjoint, adjacent, or overlapping; no
    /// validation against existing extents happens here.
    pub fn add_tile(&mut self, tile: RasterTile) {
        self.tiles.push(tile);
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Freeze the accumulated tiles into an immutable, queryable mosaic.
    pub fn finalize(self) -> RasterMosaic {
        let regions: Vec<TileRegion> = self
            .tiles
            .iter()
            .enumerate()
            .map(|(tile_index, tile)| {
                let e = tile.extent();
                TileRegion {
                    aabb: AABB::from_corners([e.xmin, e.ymin], [e.xmax, e.ymax]),
                    tile_index,
                }
            })
            .collect();

        let extent = self
            .tiles
            .iter()
            .map(|t| t.extent())
            .reduce(|a, b| a.union(&b));

        let value_range = self
            .tiles
            .iter()
            .filter_map(|t| t.value_range())
            .reduce(|(alo, ahi), (blo, bhi)| (alo.min(blo), ahi.max(bhi)));

        log::info!(
            "finalized mosaic: {} tiles, extent {:?}, value range {:?}",
            self.tiles.len(),
            extent,
            value_range
        );

        RasterMosaic {
            tiles: self.tiles,
            index: RTree::bulk_load(regions),
            extent,
            value_range,
            policy: self.policy,
        }
    }
}

/// Finalized phase: an ordered tile collection with a derived combined
/// extent and value range.
#[derive(Debug)]
pub struct RasterMosaic {
    tiles: Vec<RasterTile>,
    index: RTree<TileRegion>,
    extent: Option<Extent>,
    value_range: Option<(f64, f64)>,
    policy: OverlapPolicy,
}

impl RasterMosaic {
    /// An empty mosaic; every query fails with OutOfBounds.
    pub fn empty() -> Self {
        MosaicBuilder::new().finalize()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Union of all member tile extents.
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    /// (zmin, zmax) over all valid samples of all tiles.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.value_range
    }

    /// Elevation at (x, y).
    ///
    /// Tile containment comes from the R-tree, so lookups stay sub-linear
    /// in tile count. Extent edges are inclusive.
    pub fn interpolate(&self, x: f64, y: f64) -> Result<f64> {
        let mut covering: Vec<usize> = self
            .index
            .locate_all_at_point(&[x, y])
            .map(|r| r.tile_index)
            .collect();

        if covering.is_empty() {
            return Err(Error::OutOfBounds { x, y });
        }

        match self.policy {
            OverlapPolicy::LastWins => {
                let winner = *covering.iter().max().unwrap();
                self.tiles[winner].sample(x, y)
            }
            OverlapPolicy::Max => {
                covering.sort_unstable();
                let mut best: Option<f64> = None;
                for idx in covering {
                    if let Ok(v) = self.tiles[idx].sample(x, y) {
                        best = Some(best.map_or(v, |b: f64| b.max(v)));
                    }
                }
                best.ok_or(Error::NoData { x, y })
            }
            OverlapPolicy::Mean => {
                covering.sort_unstable();
                let mut sum = 0.0;
                let mut n = 0usize;
                for idx in covering {
                    if let Ok(v) = self.tiles[idx].sample(x, y) {
                        sum += v;
                        n += 1;
                    }
                }
                if n == 0 {
                    Err(Error::NoData { x, y })
                } else {
                    Ok(sum / n as f64)
                }
            }
        }
    }

    /// Elevations for many points, evaluated in parallel.
    ///
    /// Each point succeeds or fails independently; the output preserves
    /// input order and `interpolate_batch(&[p])[0]` always matches
    /// `interpolate(p)`.
    pub fn interpolate_batch(&self, points: &[(f64, f64)]) -> Vec<Result<f64>> {
        points
            .par_iter()
            .map(|&(x, y)| self.interpolate(x, y))
            .collect()
    }
}
