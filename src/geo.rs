use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Compute haversine distance between two points in meters.
pub fn haversine_distance(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let delta_lat = (lat2_deg - lat1_deg).to_radians();
    let delta_lon = (lon2_deg - lon1_deg).to_radians();

    let a =
        (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Axis-aligned geographic extent, inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Smallest extent covering both `self` and `other`.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            xmin: self.xmin.min(other.xmin),
            xmax: self.xmax.max(other.xmax),
            ymin: self.ymin.min(other.ymin),
            ymax: self.ymax.max(other.ymax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_sanity() {
        // Brussels (50.8503, 4.3517) to Antwerp (51.2194, 4.4025)
        // Should be roughly 41 km
        let dist = haversine_distance(50.8503, 4.3517, 51.2194, 4.4025);
        assert!(
            (dist - 41_100.0).abs() < 2000.0,
            "Brussels-Antwerp should be ~41km, got {}m",
            dist
        );

        let zero = haversine_distance(50.0, 4.0, 50.0, 4.0);
        assert!(zero.abs() < 1e-6);
    }

    #[test]
    fn test_extent_contains_inclusive() {
        let e = Extent {
            xmin: 4.0,
            xmax: 5.0,
            ymin: 50.0,
            ymax: 51.0,
        };
        assert!(e.contains(4.5, 50.5));
        assert!(e.contains(4.0, 50.0)); // corner
        assert!(e.contains(5.0, 51.0)); // corner
        assert!(!e.contains(5.0001, 50.5));
        assert!(!e.contains(4.5, 49.9999));
    }

    #[test]
    fn test_extent_union() {
        let a = Extent {
            xmin: 4.0,
            xmax: 5.0,
            ymin: 50.0,
            ymax: 51.0,
        };
        let b = Extent {
            xmin: 4.5,
            xmax: 6.0,
            ymin: 49.0,
            ymax: 50.5,
        };
        let u = a.union(&b);
        assert_eq!(u.xmin, 4.0);
        assert_eq!(u.xmax, 6.0);
        assert_eq!(u.ymin, 49.0);
        assert_eq!(u.ymax, 51.0);
    }
}
