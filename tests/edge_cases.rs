use ffgeo::bbox::{MAX_LATITUDE, MAX_LONGITUDE, PRECISION};
use ffgeo::{BoundingBox, BoxSplitter, GeoSearch, SearchConfig, fault_point};
use geo::coord;

const BOXES: [(f64, f64, f64, f64); 6] = [
    (-10.0, -10.0, 10.0, 10.0),
    (-123.4, 37.1, -121.9, 38.2),
    (2.1, 48.7, 2.6, 49.0),
    (170.0, -10.0, -170.0, 10.0),
    (-180.0, -90.0, MAX_LONGITUDE, MAX_LATITUDE),
    (91.0, 30.0, 99.0, 46.0),
];

fn total_area(boxes: &[BoundingBox]) -> f64 {
    boxes.iter().map(BoundingBox::area).sum()
}

/// Test 1: No area is created or lost beyond the nudge epsilon
#[test]
fn test_area_conservation_without_border() {
    for passes in 0..=2 {
        let splitter = BoxSplitter::new(passes, 0.0).unwrap();
        for (west, south, east, north) in BOXES {
            let root = BoundingBox::new(west, south, east, north, 1000);
            let boxes = splitter.decompose(root).unwrap();

            // Every split edge gives up one hair's width.
            let slack = boxes.len() as f64 * 360.0 * PRECISION;
            let diff = (total_area(&boxes) - root.area()).abs();
            assert!(
                diff <= slack,
                "passes {passes}, box {root}: lost {diff} square degrees"
            );
        }
    }
}

/// Test 2: Nudging only ever shrinks
#[test]
fn test_area_never_grows_with_border() {
    for passes in 0..=2 {
        let splitter = BoxSplitter::new(passes, 0.15).unwrap();
        for (west, south, east, north) in BOXES {
            let root = BoundingBox::new(west, south, east, north, 1000);
            let boxes = splitter.decompose(root).unwrap();
            assert!(total_area(&boxes) <= root.area() + 1e-6);
        }
    }
}

/// Test 3: Limit shares always add back up
#[test]
fn test_limit_conservation() {
    for passes in 0..=2 {
        for border in [0.0, 0.15, 0.3] {
            let splitter = BoxSplitter::new(passes, border).unwrap();
            for (west, south, east, north) in BOXES {
                for limit in [0, 1, 7, 100, 1001] {
                    let root = BoundingBox::new(west, south, east, north, limit);
                    let boxes = splitter.decompose(root).unwrap();
                    assert_eq!(boxes.iter().map(|b| b.limit).sum::<usize>(), limit);
                }
            }
        }
    }
}

/// Test 4: Decomposition is bounded by four boxes per pass
#[test]
fn test_box_count_bound() {
    for passes in 0..=2u8 {
        let splitter = BoxSplitter::new(passes, 0.0).unwrap();
        for (west, south, east, north) in BOXES {
            let boxes = splitter
                .decompose(BoundingBox::new(west, south, east, north, 100))
                .unwrap();
            assert!(!boxes.is_empty());
            assert!(boxes.len() <= 4usize.pow(passes.max(1) as u32));
        }
    }
}

/// Test 5: A wrapping strip comes back as non-wrapping pieces on both sides of the seam
#[test]
fn test_antimeridian_strip() {
    for passes in 0..=2 {
        let splitter = BoxSplitter::new(passes, 0.0).unwrap();
        let root = BoundingBox::new(170.0, -10.0, -170.0, 10.0, 100);
        let boxes = splitter.decompose(root).unwrap();

        assert!(boxes.iter().all(|b| !b.wraps()));
        assert!(boxes.iter().any(|b| b.west >= 170.0 && b.east > 179.9));
        assert!(boxes.iter().any(|b| b.west == -180.0 && b.east <= -170.0));
        assert!(boxes.iter().all(|b| b.west >= 170.0 || b.east <= -170.0));
        assert!((total_area(&boxes) - 400.0).abs() < 1e-5);
    }
}

/// Test 6: A fault line close to the northern edge is nudged, not split
#[test]
fn test_fault_line_nudge() {
    let root = BoundingBox::new(91.0, 30.0, 99.0, 46.0, 100);
    let fault = fault_point(root.south_west(), root.north_east()).unwrap();
    assert_eq!(fault, coord! { x: 135.0, y: 45.0 });

    let boxes = BoxSplitter::new(1, 0.15).unwrap().decompose(root).unwrap();
    assert_eq!(boxes.len(), 1);
    assert!(boxes[0].north < 45.0);
    assert_eq!(boxes[0].north, 45.0 - PRECISION);
    assert_eq!(boxes[0].south, 30.0);
    assert_eq!(boxes[0].limit, 100);

    // Without a border the same box is split at the fault.
    let boxes = BoxSplitter::new(1, 0.0).unwrap().decompose(root).unwrap();
    assert_eq!(boxes.len(), 2);
}

/// Test 7: Poles and the antimeridian are clamped inside the valid range
#[test]
fn test_global_box_is_clamped() {
    let search = GeoSearch::new(SearchConfig::new("-180,-90,180,90").with_correction(1)).unwrap();
    let root = search.root();
    assert_eq!(root.east, MAX_LONGITUDE);
    assert_eq!(root.north, MAX_LATITUDE);
    assert_eq!(search.boxes().len(), 4);
    assert!(search.boxes().iter().all(|b| b.east <= MAX_LONGITUDE));
}

/// Test 8: Inverted longitudes of the same sign mean the whole globe
#[test]
fn test_inverted_same_sign_longitudes() {
    let search = GeoSearch::new(SearchConfig::new("20,0,10,5")).unwrap();
    assert_eq!(search.root().west, -180.0);
    assert_eq!(search.root().east, MAX_LONGITUDE);
}

/// Test 9: Cache rounding snaps nearby boxes onto the same edges
#[test]
fn test_cache_rounding_shares_boxes() {
    let a = BoundingBox::parse("-74.012,40.701,-73.968,40.739", 10).unwrap();
    let b = BoundingBox::parse("-74.009,40.704,-73.972,40.742", 10).unwrap();
    assert_eq!(a.normalized(true), b.normalized(true));
    assert_ne!(a.normalized(false), b.normalized(false));
}

/// Test 10: Degenerate and malformed boxes
#[test]
fn test_malformed_boxes() {
    assert!(BoundingBox::parse("1,2,3", 10).is_err());
    assert!(BoundingBox::parse("a,b,c,d", 10).is_err());
    assert!(BoundingBox::parse("0,NaN,1,1", 10).is_err());
    assert!(BoundingBox::parse("0,10,1,5", 10).is_err());

    // A flat box is legal.
    let flat = GeoSearch::new(SearchConfig::new("0,10,1,10").with_correction(2)).unwrap();
    assert!(!flat.boxes().is_empty());
}
