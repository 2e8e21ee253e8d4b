//! Fault-line aware decomposition of a bounding box into geohash-safe boxes.
//!
//! A single geohash range `sw_hash..ne_hash` only covers a box faithfully when
//! the box does not straddle a fault line: the axes through the center of the
//! smallest geohash cell containing both corners. Each correction pass splits
//! every box across its fault lines (1 box becomes up to 4), handing each
//! piece a share of the limit proportional to its extent. Pieces thinner than
//! the border fraction are not split off; the box is nudged off the fault line
//! instead, giving up that sliver in exchange for one less sub-query.

use crate::bbox::{BoundingBox, MAX_LONGITUDE, PRECISION, fault_point, sign};
use crate::error::{Result, SearchError};
use smallvec::{SmallVec, smallvec};

/// Highest number of correction passes accepted.
pub const MAX_CORRECTION_PASSES: u8 = 2;

/// Boxes produced by one split: the input plus up to three new pieces.
pub type SplitBoxes = SmallVec<[BoundingBox; 4]>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSplitter {
    passes: u8,
    border: f64,
}

impl BoxSplitter {
    pub fn new(passes: u8, border: f64) -> Result<Self> {
        if passes > MAX_CORRECTION_PASSES {
            return Err(SearchError::InvalidConfig(format!(
                "correction passes must be at most {MAX_CORRECTION_PASSES}, got {passes}"
            )));
        }
        if !(0.0..=0.5).contains(&border) {
            return Err(SearchError::InvalidConfig(format!(
                "border fraction must be within 0.0..=0.5, got {border}"
            )));
        }
        Ok(Self { passes, border })
    }

    pub fn passes(&self) -> u8 {
        self.passes
    }

    pub fn border(&self) -> f64 {
        self.border
    }

    /// Decompose `root` into the boxes to query, in submission order.
    ///
    /// A box crossing the antimeridian always gets at least one pass, since no
    /// geohash range can run through the seam.
    pub fn decompose(&self, root: BoundingBox) -> Result<Vec<BoundingBox>> {
        let passes = if root.wraps() {
            self.passes.max(1)
        } else {
            self.passes
        };

        let mut boxes = vec![root];
        for _ in 0..passes {
            let mut next = Vec::with_capacity(boxes.len() * 4);
            for bbox in boxes {
                next.extend(self.split(bbox, true)?);
            }
            boxes = next;
        }

        // Settle remaining nudges without fragmenting any further.
        if passes > 0 {
            for bbox in boxes.iter_mut() {
                *bbox = self.split(*bbox, false)?[0];
            }
        }

        Ok(boxes)
    }

    /// One correction step over a single box.
    ///
    /// With `allow_split == false` only nudges are applied and exactly one box
    /// comes back. The first returned box is always the (possibly shrunk) input.
    pub fn split(&self, bbox: BoundingBox, allow_split: bool) -> Result<SplitBoxes> {
        let mut boxes: SplitBoxes = smallvec![bbox];

        let wraps = bbox.wraps();
        let span = bbox.lng_span();

        let fault = fault_point(bbox.south_west(), bbox.north_east())?;
        let fault_lat = fault.y;
        let fault_lng = if wraps { -180.0 } else { fault.x };

        if sign(bbox.south - fault_lat) != sign(bbox.north - fault_lat) {
            let mix = (bbox.north - fault_lat) / bbox.lat_span();

            if mix < self.border {
                boxes[0].north = fault_lat - PRECISION;
            } else if mix > 1.0 - self.border {
                boxes[0].south = fault_lat;
            } else if allow_split {
                let upper = share(bbox.limit, mix);
                boxes.push(BoundingBox {
                    south: fault_lat,
                    limit: upper,
                    ..bbox
                });
                boxes[0].north = fault_lat - PRECISION;
                boxes[0].limit -= upper;
            }
        }

        if wraps || sign(bbox.west - fault_lng) != sign(bbox.east - fault_lng) {
            // Fraction of the box east of the fault (or of the seam).
            let mix = (bbox.east - fault_lng) / span;
            let (east_piece_west, west_piece_east) = if wraps {
                (-180.0, MAX_LONGITUDE)
            } else {
                (fault_lng, fault_lng - PRECISION)
            };

            let mut more = SplitBoxes::new();
            for piece in boxes.iter_mut() {
                if mix < self.border {
                    piece.east = west_piece_east;
                } else if mix > 1.0 - self.border {
                    piece.west = east_piece_west;
                } else if allow_split {
                    let east_limit = share(piece.limit, mix);
                    more.push(BoundingBox {
                        west: east_piece_west,
                        limit: east_limit,
                        ..*piece
                    });
                    piece.east = west_piece_east;
                    piece.limit -= east_limit;
                }
            }
            boxes.extend(more);
        }

        Ok(boxes)
    }
}

impl Default for BoxSplitter {
    fn default() -> Self {
        Self {
            passes: 0,
            border: 0.15,
        }
    }
}

fn share(limit: usize, mix: f64) -> usize {
    ((limit as f64 * mix).round() as usize).min(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_limit(boxes: &[BoundingBox]) -> usize {
        boxes.iter().map(|b| b.limit).sum()
    }

    #[test]
    fn test_rejects_out_of_range_settings() {
        assert!(BoxSplitter::new(3, 0.15).is_err());
        assert!(BoxSplitter::new(1, 0.75).is_err());
        assert!(BoxSplitter::new(1, -0.1).is_err());
        assert!(BoxSplitter::new(2, 0.0).is_ok());
    }

    #[test]
    fn test_no_passes_keeps_single_box() {
        let splitter = BoxSplitter::new(0, 0.15).unwrap();
        let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0, 100);
        let boxes = splitter.decompose(bbox).unwrap();
        assert_eq!(boxes, vec![bbox]);
    }

    #[test]
    fn test_split_four_ways_at_origin() {
        let splitter = BoxSplitter::new(1, 0.15).unwrap();
        let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0, 100);
        let boxes = splitter.split(bbox, true).unwrap();

        assert_eq!(boxes.len(), 4);
        assert_eq!(total_limit(&boxes), 100);
        for piece in &boxes {
            assert_eq!(piece.limit, 25);
            assert!(!(piece.west < 0.0 && piece.east > 0.0));
            assert!(!(piece.south < 0.0 && piece.north > 0.0));
        }

        // South-west piece is the shrunk input.
        assert_eq!(boxes[0].north, -PRECISION);
        assert_eq!(boxes[0].east, -PRECISION);
    }

    #[test]
    fn test_uneven_split_redistributes_limit() {
        let splitter = BoxSplitter::new(1, 0.15).unwrap();
        // 30% of the height lies north of the equator.
        let bbox = BoundingBox::new(10.0, -7.0, 20.0, 3.0, 101);
        let boxes = splitter.split(bbox, true).unwrap();

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].south, 0.0);
        assert_eq!(boxes[1].limit, 30);
        assert_eq!(boxes[0].limit, 71);
    }

    #[test]
    fn test_nudge_below_fault_near_north() {
        let splitter = BoxSplitter::new(1, 0.15).unwrap();
        // Only 5 of 45 degrees sit north of the equator: nudge instead of split.
        let bbox = BoundingBox::new(10.0, -40.0, 20.0, 5.0, 100);
        let boxes = splitter.decompose(bbox).unwrap();

        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].north < 0.0);
        assert_eq!(boxes[0].limit, 100);
    }

    #[test]
    fn test_nudge_above_fault_near_south() {
        let splitter = BoxSplitter::new(1, 0.15).unwrap();
        let bbox = BoundingBox::new(10.0, -5.0, 20.0, 40.0, 100);
        let boxes = splitter.split(bbox, true).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].south, 0.0);
    }

    #[test]
    fn test_no_split_when_disabled() {
        let splitter = BoxSplitter::new(1, 0.15).unwrap();
        let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0, 100);
        let boxes = splitter.split(bbox, false).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], bbox);
    }

    #[test]
    fn test_wraparound_splits_at_seam() {
        let splitter = BoxSplitter::new(1, 0.0).unwrap();
        let bbox = BoundingBox::new(170.0, 10.0, -170.0, 20.0, 40);
        let boxes = splitter.decompose(bbox).unwrap();

        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| !b.wraps()));
        assert_eq!((boxes[0].west, boxes[0].east), (170.0, MAX_LONGITUDE));
        assert_eq!((boxes[1].west, boxes[1].east), (-180.0, -170.0));
        assert_eq!(total_limit(&boxes), 40);
    }

    #[test]
    fn test_wraparound_forces_a_pass() {
        let splitter = BoxSplitter::new(0, 0.0).unwrap();
        let bbox = BoundingBox::new(170.0, 10.0, -170.0, 20.0, 40);
        let boxes = splitter.decompose(bbox).unwrap();
        assert!(boxes.iter().all(|b| !b.wraps()));
    }

    #[test]
    fn test_second_pass_refines_further() {
        let bbox = BoundingBox::new(-30.0, -30.0, 60.0, 50.0, 1000);
        let once = BoxSplitter::new(1, 0.0).unwrap().decompose(bbox).unwrap();
        let twice = BoxSplitter::new(2, 0.0).unwrap().decompose(bbox).unwrap();

        assert!(twice.len() >= once.len());
        assert_eq!(total_limit(&once), 1000);
        assert_eq!(total_limit(&twice), 1000);
    }
}
