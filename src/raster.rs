//! Gridded elevation tiles.
//!
//! A tile is a regular grid of samples over a rectangular extent. Samples
//! sit on grid nodes: a width x height tile spans (width-1) x (height-1)
//! cells, row 0 is the northern edge. Decoding is delegated to the `tiff`
//! collaborator; georeferencing comes from the ModelTiepoint (33922) and
//! ModelPixelScale (33550) tags, the nodata sentinel from GDAL_NODATA
//! (42113).

use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::geo::Extent;

const TAG_MODEL_PIXEL_SCALE: u32 = 33550;
const TAG_MODEL_TIEPOINT: u32 = 33922;
const TAG_GDAL_NODATA: u32 = 42113;

/// One loaded elevation raster with a fixed extent and regular grid.
#[derive(Debug, Clone)]
pub struct RasterTile {
    name: String,
    extent: Extent,
    width: usize,
    height: usize,
    /// Row-major samples, row 0 = north. Single contiguous allocation.
    data: Vec<f32>,
    nodata: Option<f32>,
}

impl RasterTile {
    /// Load a tile from a GeoTIFF file.
    pub fn from_tiff<P: AsRef<Path>>(path: P) -> Result<RasterTile> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("raster")
            .to_string();

        let file = std::fs::File::open(path)?;
        let mut decoder = Decoder::new(file)?;

        // Raise limits so 1-degree DEM tiles decode without truncation
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT as u16));
        let scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE as u16));
        let extent = match (tiepoint, scale) {
            (Ok(tie), Ok(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
                // Tiepoint [i, j, k, x, y, z]: pixel (i, j) sits at geo (x, y)
                let tie_x = tie[3];
                let tie_y = tie[4];
                let dx = scale[0];
                let dy = scale[1];
                Extent {
                    xmin: tie_x,
                    xmax: tie_x + (width as f64 - 1.0) * dx,
                    ymin: tie_y - (height as f64 - 1.0) * dy,
                    ymax: tie_y,
                }
            }
            _ => {
                return Err(Error::MalformedSource {
                    name,
                    detail: "missing ModelTiepoint/ModelPixelScale georeferencing tags"
                        .to_string(),
                })
            }
        };

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA as u16))
            .ok()
            .and_then(|s| s.trim().parse::<f32>().ok());

        let data = decode_samples(&mut decoder)?;
        if data.len() != width * height {
            return Err(Error::MalformedSource {
                name,
                detail: format!(
                    "sample count {} does not match {}x{} dimensions",
                    data.len(),
                    width,
                    height
                ),
            });
        }

        log::info!(
            "loaded raster tile '{}': {}x{} samples, extent [{}, {}] x [{}, {}]",
            name,
            width,
            height,
            extent.xmin,
            extent.xmax,
            extent.ymin,
            extent.ymax
        );

        Ok(RasterTile {
            name,
            extent,
            width,
            height,
            data,
            nodata,
        })
    }

    /// Build a tile from an in-memory grid (used in tests).
    ///
    /// Panics if the data length does not match the dimensions.
    pub fn from_grid(
        name: &str,
        extent: Extent,
        width: usize,
        height: usize,
        data: Vec<f32>,
        nodata: Option<f32>,
    ) -> RasterTile {
        assert_eq!(
            data.len(),
            width * height,
            "data length must be width * height"
        );
        RasterTile {
            name: name.to_string(),
            extent,
            width,
            height,
            data,
            nodata,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Grid spacing in extent units per cell.
    pub fn resolution(&self) -> (f64, f64) {
        let dx = (self.extent.xmax - self.extent.xmin) / (self.width.max(2) - 1) as f64;
        let dy = (self.extent.ymax - self.extent.ymin) / (self.height.max(2) - 1) as f64;
        (dx, dy)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.extent.contains(x, y)
    }

    fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nodata) => (value - nodata).abs() < 1e-3,
            None => false,
        }
    }

    /// Raw sample at (row, col), None when nodata.
    fn get_raw(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let value = self.data[row * self.width + col];
        if self.is_nodata(value) {
            None
        } else {
            Some(value as f64)
        }
    }

    /// (zmin, zmax) over valid samples, None when every sample is nodata.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for &value in &self.data {
            if self.is_nodata(value) {
                continue;
            }
            let v = value as f64;
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        range
    }

    /// Fractional (row, col) of a point inside the extent, clamped to the
    /// grid to guard against floating-point edge cases.
    fn grid_position(&self, x: f64, y: f64) -> (f64, f64) {
        let x_range = self.extent.xmax - self.extent.xmin;
        let y_range = self.extent.ymax - self.extent.ymin;
        let col = if x_range > 0.0 {
            (x - self.extent.xmin) / x_range * (self.width - 1) as f64
        } else {
            0.0
        };
        let row = if y_range > 0.0 {
            (self.extent.ymax - y) / y_range * (self.height - 1) as f64
        } else {
            0.0
        };
        (
            row.clamp(0.0, (self.height - 1) as f64),
            col.clamp(0.0, (self.width - 1) as f64),
        )
    }

    /// Bilinearly interpolated elevation at (x, y).
    ///
    /// If any of the four surrounding samples is nodata, falls back to the
    /// nearest valid sample in the tile; with no valid sample at all the
    /// query fails with [`Error::NoData`]. Outside the extent it fails with
    /// [`Error::OutOfBounds`].
    pub fn sample(&self, x: f64, y: f64) -> Result<f64> {
        if !self.contains(x, y) {
            return Err(Error::OutOfBounds { x, y });
        }

        let (row_f, col_f) = self.grid_position(x, y);

        // Top-left corner of the 2x2 interpolation cell; step back when
        // exactly on the last row/col so the cell stays in range.
        let row0 = (row_f.floor() as usize).min(self.height.saturating_sub(2));
        let col0 = (col_f.floor() as usize).min(self.width.saturating_sub(2));
        let row1 = (row0 + 1).min(self.height - 1);
        let col1 = (col0 + 1).min(self.width - 1);

        let corners = [
            self.get_raw(row0, col0),
            self.get_raw(row0, col1),
            self.get_raw(row1, col0),
            self.get_raw(row1, col1),
        ];

        if let [Some(v00), Some(v01), Some(v10), Some(v11)] = corners {
            let dr = (row_f - row0 as f64).clamp(0.0, 1.0);
            let dc = (col_f - col0 as f64).clamp(0.0, 1.0);
            let top = v00 + (v01 - v00) * dc;
            let bot = v10 + (v11 - v10) * dc;
            return Ok(top + (bot - top) * dr);
        }

        self.nearest_valid(row_f, col_f)
            .ok_or(Error::NoData { x, y })
    }

    /// Nearest valid sample to a fractional grid position, searching in
    /// expanding rings. One extra ring is scanned past the first hit because
    /// the Euclidean-nearest sample can sit one Chebyshev ring further out.
    fn nearest_valid(&self, row_f: f64, col_f: f64) -> Option<f64> {
        let center_row = row_f.round() as i64;
        let center_col = col_f.round() as i64;
        let max_radius = (self.height.max(self.width)) as i64;

        let mut best: Option<(f64, f64)> = None; // (squared distance, value)
        let mut hit_radius: Option<i64> = None;

        for radius in 0..=max_radius {
            if let Some(hit) = hit_radius {
                if radius > hit + 1 {
                    break;
                }
            }
            for (row, col) in ring_cells(center_row, center_col, radius) {
                if row < 0 || col < 0 || row >= self.height as i64 || col >= self.width as i64 {
                    continue;
                }
                if let Some(value) = self.get_raw(row as usize, col as usize) {
                    let dr = row as f64 - row_f;
                    let dc = col as f64 - col_f;
                    let d2 = dr * dr + dc * dc;
                    if best.map_or(true, |(bd, _)| d2 < bd) {
                        best = Some((d2, value));
                    }
                    hit_radius.get_or_insert(radius);
                }
            }
        }

        best.map(|(_, value)| value)
    }
}

/// Cells on the Chebyshev ring at `radius` around a center.
fn ring_cells(center_row: i64, center_col: i64, radius: i64) -> Vec<(i64, i64)> {
    if radius == 0 {
        return vec![(center_row, center_col)];
    }
    let mut cells = Vec::with_capacity((radius as usize) * 8);
    for col in (center_col - radius)..=(center_col + radius) {
        cells.push((center_row - radius, col));
        cells.push((center_row + radius, col));
    }
    for row in (center_row - radius + 1)..(center_row + radius) {
        cells.push((row, center_col - radius));
        cells.push((row, center_col + radius));
    }
    cells
}

fn decode_samples<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;
    let data = match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODATA: f32 = -32768.0;

    // 3x3 tile over [4, 5] x [50, 51]:
    //
    //   NW=100  N=200  NE=300    (row 0, y = 51)
    //   W=400   C=500  E=600     (row 1, y = 50.5)
    //   SW=700  S=800  SE=900    (row 2, y = 50)
    fn make_3x3_tile() -> RasterTile {
        #[rustfmt::skip]
        let data = vec![
            100.0, 200.0, 300.0,
            400.0, 500.0, 600.0,
            700.0, 800.0, 900.0,
        ];
        RasterTile::from_grid(
            "t",
            Extent {
                xmin: 4.0,
                xmax: 5.0,
                ymin: 50.0,
                ymax: 51.0,
            },
            3,
            3,
            data,
            Some(NODATA),
        )
    }

    #[test]
    fn test_bilinear_interpolation() {
        let tile = make_3x3_tile();

        // Exact grid node
        let center = tile.sample(4.5, 50.5).unwrap();
        assert!((center - 500.0).abs() < 1e-6, "center: {}", center);

        // Midpoint between NW (100) and N (200)
        let nw_n = tile.sample(4.25, 51.0).unwrap();
        assert!((nw_n - 150.0).abs() < 1e-6, "nw-n midpoint: {}", nw_n);

        // Interior point: row_f = 0.5, col_f = 0.5 between 100/200/400/500
        let interior = tile.sample(4.25, 50.75).unwrap();
        assert!((interior - 300.0).abs() < 1e-6, "interior: {}", interior);
    }

    #[test]
    fn test_corners_inclusive() {
        let tile = make_3x3_tile();
        assert!((tile.sample(4.0, 50.0).unwrap() - 700.0).abs() < 1e-6);
        assert!((tile.sample(4.0, 51.0).unwrap() - 100.0).abs() < 1e-6);
        assert!((tile.sample(5.0, 51.0).unwrap() - 300.0).abs() < 1e-6);
        assert!((tile.sample(5.0, 50.0).unwrap() - 900.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_bounds() {
        let tile = make_3x3_tile();
        assert!(matches!(
            tile.sample(5.0001, 50.5),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            tile.sample(4.5, 49.0),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_nodata_falls_back_to_nearest_valid() {
        #[rustfmt::skip]
        let data = vec![
            100.0, 200.0,  300.0,
            400.0, NODATA, 600.0,
            700.0, 800.0,  900.0,
        ];
        let tile = RasterTile::from_grid(
            "t",
            Extent {
                xmin: 4.0,
                xmax: 5.0,
                ymin: 50.0,
                ymax: 51.0,
            },
            3,
            3,
            data,
            Some(NODATA),
        );

        // Query at the void node itself: nearest valid neighbor wins.
        // All four orthogonal neighbors are equidistant; the search scans
        // the ring top row first, so N (200) is selected deterministically.
        let center = tile.sample(4.5, 50.5).unwrap();
        assert!((center - 200.0).abs() < 1e-6, "center fallback: {}", center);

        // A query whose interpolation cell touches the void falls back too.
        // (4.4, 50.6) maps to (row 0.8, col 0.8); nodes (0,1) and (1,0)
        // tie at distance^2 0.68 and (0,1) is found first.
        let near = tile.sample(4.4, 50.6).unwrap();
        assert!((near - 200.0).abs() < 1e-6, "near-void fallback: {}", near);
    }

    #[test]
    fn test_all_nodata_is_nodata_error() {
        let tile = RasterTile::from_grid(
            "t",
            Extent {
                xmin: 4.0,
                xmax: 5.0,
                ymin: 50.0,
                ymax: 51.0,
            },
            2,
            2,
            vec![NODATA; 4],
            Some(NODATA),
        );
        assert!(matches!(
            tile.sample(4.5, 50.5),
            Err(Error::NoData { .. })
        ));
        assert!(tile.value_range().is_none());
    }

    #[test]
    fn test_value_range_skips_nodata() {
        #[rustfmt::skip]
        let data = vec![
            10.0,  NODATA,
            30.0,  20.0,
        ];
        let tile = RasterTile::from_grid(
            "t",
            Extent {
                xmin: 0.0,
                xmax: 1.0,
                ymin: 0.0,
                ymax: 1.0,
            },
            2,
            2,
            data,
            Some(NODATA),
        );
        assert_eq!(tile.value_range(), Some((10.0, 30.0)));
    }

    #[test]
    fn test_resolution() {
        let tile = make_3x3_tile();
        let (dx, dy) = tile.resolution();
        assert!((dx - 0.5).abs() < 1e-12);
        assert!((dy - 0.5).abs() < 1e-12);
    }
}
