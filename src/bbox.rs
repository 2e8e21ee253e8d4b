//! Bounding boxes, geohash intervals and fault point location.
//!
//! A [`BoundingBox`] is expressed as `west, south, east, north` degrees plus the
//! number of results it may contribute. `west > east` means the box crosses the
//! antimeridian.

use crate::error::{Result, SearchError};
use geo::{Coord, Rect, coord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The width of a split hair. Nudged edges sit this far below a fault line.
pub const PRECISION: f64 = 1e-8;

/// Longest geohash the encoder supports.
pub const MAX_GEOHASH_PRECISION: usize = 12;

/// Sorts after every geohash character. Appended to a range end so hashes
/// sharing the north-east corner's prefix stay inside the range.
pub const RANGE_END_SENTINEL: char = '~';

/// Easternmost longitude a box edge may take.
pub const MAX_LONGITUDE: f64 = 180.0 - PRECISION;

/// Northernmost latitude a box edge may take.
pub const MAX_LATITUDE: f64 = 90.0 - PRECISION;

/// A query rectangle with its share of the overall result limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub limit: usize,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64, limit: usize) -> Self {
        Self {
            west,
            south,
            east,
            north,
            limit,
        }
    }

    /// The whole globe.
    pub fn global(limit: usize) -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0, limit)
    }

    /// Parse a `"west,south,east,north"` string.
    pub fn parse(bbox: &str, limit: usize) -> Result<Self> {
        let values = bbox
            .split(',')
            .map(|part| {
                part.trim().parse::<f64>().map_err(|_| {
                    SearchError::InvalidBoundingBox(format!("'{}' is not a number", part.trim()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let &[west, south, east, north] = values.as_slice() else {
            return Err(SearchError::InvalidBoundingBox(format!(
                "expected west,south,east,north but got {} values",
                values.len()
            )));
        };

        if values.iter().any(|v| !v.is_finite()) {
            log::warn!("Rejecting bounding box with non-finite coordinates");
            return Err(SearchError::InvalidBoundingBox(
                "coordinates must be finite".to_string(),
            ));
        }

        if south > north {
            return Err(SearchError::InvalidBoundingBox(format!(
                "south ({south}) is above north ({north})"
            )));
        }

        Ok(Self::new(west, south, east, north, limit))
    }

    /// True if the box crosses the antimeridian.
    pub fn wraps(&self) -> bool {
        self.west > self.east
    }

    /// Longitude span in degrees, counting through the antimeridian for
    /// wrapping boxes. A zero span means the full 360 degrees.
    pub fn lng_span(&self) -> f64 {
        let mut span = self.east - self.west;
        if self.wraps() {
            span += 360.0;
        }
        if span == 0.0 { 360.0 } else { span }
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    /// Planar area in square degrees.
    pub fn area(&self) -> f64 {
        self.rects().iter().map(|r| r.width() * r.height()).sum()
    }

    /// The box as one rectangle, or two when it wraps the antimeridian.
    pub fn rects(&self) -> Vec<Rect> {
        if self.wraps() {
            vec![
                Rect::new(
                    coord! { x: self.west, y: self.south },
                    coord! { x: 180.0, y: self.north },
                ),
                Rect::new(
                    coord! { x: -180.0, y: self.south },
                    coord! { x: self.east, y: self.north },
                ),
            ]
        } else {
            vec![Rect::new(
                coord! { x: self.west, y: self.south },
                coord! { x: self.east, y: self.north },
            )]
        }
    }

    pub fn south_west(&self) -> Coord {
        coord! { x: self.west, y: self.south }
    }

    pub fn north_east(&self) -> Coord {
        coord! { x: self.east, y: self.north }
    }

    /// Normalize a caller supplied box before splitting.
    ///
    /// Same-sign inverted longitudes mean the whole globe. When `round_for_cache`
    /// is set, edges are rounded to a precision matching the box size so that
    /// nearby requests share cache keys. Finally every edge is clamped inside
    /// the valid coordinate range.
    pub fn normalized(mut self, round_for_cache: bool) -> Self {
        if sign(self.west) == sign(self.east) && self.east < self.west {
            self.west = -180.0;
            self.east = 180.0;
        }

        if round_for_cache {
            let lng_places = 1 - self.lng_span().log10().round() as i32;
            self.west = round_to(self.west, lng_places);
            self.east = round_to(self.east, lng_places);

            let height = self.lat_span();
            if height > 0.0 {
                let lat_places = 1 - height.log10().round() as i32;
                self.south = round_to(self.south, lat_places);
                self.north = round_to(self.north, lat_places);
            }
        }

        self.west = self.west.clamp(-180.0, MAX_LONGITUDE);
        self.east = self.east.clamp(-180.0, MAX_LONGITUDE);
        self.south = self.south.clamp(-90.0, MAX_LATITUDE);
        self.north = self.north.clamp(-90.0, MAX_LATITUDE);
        self
    }

    /// Geohash range spanned by the south-west and north-east corners.
    ///
    /// Stored hashes may be longer than `precision`, so the end is the
    /// north-east cell followed by [`RANGE_END_SENTINEL`].
    pub fn interval(&self, precision: usize) -> Result<GeohashInterval> {
        let mut end = geohash::encode(self.north_east(), precision)?;
        end.push(RANGE_END_SENTINEL);
        Ok(GeohashInterval {
            start: geohash::encode(self.south_west(), precision)?,
            end,
        })
    }

    /// Closed polygon ring `[[w,s],[e,s],[e,n],[w,n],[w,s]]`.
    pub fn ring(&self) -> Vec<Vec<f64>> {
        vec![
            vec![self.west, self.south],
            vec![self.east, self.south],
            vec![self.east, self.north],
            vec![self.west, self.north],
            vec![self.west, self.south],
        ]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{} (limit {})",
            self.west, self.south, self.east, self.north, self.limit
        )
    }
}

/// Exclusive geohash range `start < geohash < end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeohashInterval {
    pub start: String,
    pub end: String,
}

impl GeohashInterval {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains(&self, geohash: &str) -> bool {
        geohash > self.start.as_str() && geohash < self.end.as_str()
    }

    /// An inverted interval can never match anything.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for GeohashInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Locate the point where the geohash ordering between two corners breaks.
///
/// This is the center of the smallest geohash cell (at bit resolution) that
/// contains both `sw` and `ne`. A box straddling either axis through this
/// point cannot be served by a single geohash range without sweeping in
/// unrelated area.
pub fn fault_point(sw: Coord, ne: Coord) -> Result<Coord> {
    let sw_hash = geohash::encode(sw, MAX_GEOHASH_PRECISION)?;
    let ne_hash = geohash::encode(ne, MAX_GEOHASH_PRECISION)?;

    let shared = sw_hash
        .bytes()
        .zip(ne_hash.bytes())
        .take_while(|(a, b)| a == b)
        .count();

    let mut cell = if shared == 0 {
        world()
    } else {
        geohash::decode_bbox(&sw_hash[..shared])?
    };

    // Geohash interleaves bits starting with longitude; 5 bits per character.
    for bit in shared * 5..MAX_GEOHASH_PRECISION * 5 {
        let mid = cell.center();
        let (min, max) = (cell.min(), cell.max());
        if bit % 2 == 0 {
            let east = sw.x >= mid.x;
            if east != (ne.x >= mid.x) {
                break;
            }
            cell = if east {
                Rect::new(coord! { x: mid.x, y: min.y }, max)
            } else {
                Rect::new(min, coord! { x: mid.x, y: max.y })
            };
        } else {
            let north = sw.y >= mid.y;
            if north != (ne.y >= mid.y) {
                break;
            }
            cell = if north {
                Rect::new(coord! { x: min.x, y: mid.y }, max)
            } else {
                Rect::new(min, coord! { x: max.x, y: mid.y })
            };
        }
    }

    Ok(cell.center())
}

fn world() -> Rect {
    Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 })
}

pub(crate) fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Round to `places` decimal places; negative places round to tens, hundreds...
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::parse("-74.1, 40.6, -73.9, 40.8", 50).unwrap();
        assert_eq!(bbox.west, -74.1);
        assert_eq!(bbox.north, 40.8);
        assert_eq!(bbox.limit, 50);
        assert!(!bbox.wraps());
    }

    #[test]
    fn test_parse_bbox_rejects_garbage() {
        assert!(BoundingBox::parse("1,2,3", 10).is_err());
        assert!(BoundingBox::parse("a,2,3,4", 10).is_err());
        assert!(BoundingBox::parse("0,NaN,1,1", 10).is_err());
        assert!(BoundingBox::parse("0,10,1,5", 10).is_err());
    }

    #[test]
    fn test_span_wraparound_and_zero() {
        let wrapping = BoundingBox::new(170.0, 0.0, -170.0, 10.0, 1);
        assert!(wrapping.wraps());
        assert_eq!(wrapping.lng_span(), 20.0);
        assert_eq!(wrapping.rects().len(), 2);
        assert!((wrapping.area() - 200.0).abs() < 1e-9);

        let zero = BoundingBox::new(10.0, 0.0, 10.0, 10.0, 1);
        assert_eq!(zero.lng_span(), 360.0);
    }

    #[test]
    fn test_normalized_global_wraparound() {
        // Same sign with east < west is read as the whole globe.
        let bbox = BoundingBox::new(20.0, -10.0, 10.0, 10.0, 1).normalized(false);
        assert_eq!(bbox.west, -180.0);
        assert_eq!(bbox.east, MAX_LONGITUDE);

        // Opposite signs stay a real antimeridian crossing.
        let bbox = BoundingBox::new(170.0, -10.0, -170.0, 10.0, 1).normalized(false);
        assert!(bbox.wraps());
    }

    #[test]
    fn test_normalized_clamps_edges() {
        let bbox = BoundingBox::global(10).normalized(false);
        assert_eq!(bbox.east, MAX_LONGITUDE);
        assert_eq!(bbox.north, MAX_LATITUDE);
        assert_eq!(bbox.west, -180.0);
        assert_eq!(bbox.south, -90.0);
    }

    #[test]
    fn test_normalized_cache_rounding() {
        // 0.2 degree span rounds to 2 decimal places.
        let bbox = BoundingBox::new(-74.1234, 40.6111, -73.9234, 40.8111, 1).normalized(true);
        assert!((bbox.west - -74.12).abs() < 1e-9);
        assert!((bbox.east - -73.92).abs() < 1e-9);
        assert!((bbox.south - 40.61).abs() < 1e-9);
        assert!((bbox.north - 40.81).abs() < 1e-9);
    }

    #[test]
    fn test_interval_ordering() {
        let bbox = BoundingBox::new(-74.1, 40.6, -73.9, 40.8, 1);
        let interval = bbox.interval(8).unwrap();
        assert!(!interval.is_empty());
        assert!(interval.start.starts_with("dr"));

        let inside = geohash::encode(coord! { x: -74.0, y: 40.7 }, 8).unwrap();
        assert!(interval.contains(&inside));
    }

    #[test]
    fn test_interval_keeps_north_east_cell_at_low_precision() {
        let bbox = BoundingBox::new(-10.0, 40.0, 20.0, 60.0, 1);
        let interval = bbox.interval(3).unwrap();
        let corner_cell = geohash::encode(bbox.north_east(), 3).unwrap();
        assert_eq!(interval.end, format!("{corner_cell}~"));

        let corner = geohash::encode(coord! { x: 19.9, y: 59.9 }, MAX_GEOHASH_PRECISION).unwrap();
        assert!(corner.starts_with(&corner_cell));
        assert!(interval.contains(&corner));
    }

    #[test]
    fn test_fault_point_across_equator_and_meridian() {
        let fault = fault_point(coord! { x: -10.0, y: -10.0 }, coord! { x: 10.0, y: 10.0 }).unwrap();
        assert_eq!(fault, coord! { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_fault_point_within_hemisphere() {
        // Both corners north-east of the origin: the first differing bit is
        // the longitude split at 90E of the north-east quadrant.
        let fault = fault_point(coord! { x: 80.0, y: 10.0 }, coord! { x: 100.0, y: 20.0 }).unwrap();
        assert_eq!(fault.x, 90.0);
        assert_eq!(fault.y, 45.0);
    }

    #[test]
    fn test_fault_point_same_cell() {
        let p = coord! { x: 12.5, y: 41.9 };
        let fault = fault_point(p, p).unwrap();
        assert!((fault.x - p.x).abs() < 1e-6);
        assert!((fault.y - p.y).abs() < 1e-6);
    }
}
