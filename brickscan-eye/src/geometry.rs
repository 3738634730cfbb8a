//! Area band filter for candidate regions

use brickscan_core::Region;

/// Outcome of checking one region against the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    TooSmall,
    TooLarge,
    /// Empty or negative box, or an area that is not a positive number
    Degenerate,
}

/// Keeps regions whose contour area lies in `[min_area, max_area]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryFilter {
    min_area: f64,
    max_area: f64,
}

impl GeometryFilter {
    pub fn new(min_area: f64, max_area: f64) -> Self {
        Self { min_area, max_area }
    }

    pub fn min_area(&self) -> f64 {
        self.min_area
    }

    pub fn max_area(&self) -> f64 {
        self.max_area
    }

    pub fn accept(&self, region: &Region) -> bool {
        self.classify(region) == Verdict::Accepted
    }

    pub fn classify(&self, region: &Region) -> Verdict {
        if region.bounding_box.is_degenerate() || !region.area.is_finite() || region.area <= 0.0 {
            return Verdict::Degenerate;
        }
        if region.area < self.min_area {
            Verdict::TooSmall
        } else if region.area > self.max_area {
            Verdict::TooLarge
        } else {
            Verdict::Accepted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickscan_core::BoundingBox;
    use proptest::prelude::*;

    fn region(width: i32, height: i32, area: f64) -> Region {
        Region::new(BoundingBox::new(0, 0, width, height), area)
    }

    #[test]
    fn test_band_is_inclusive() {
        let filter = GeometryFilter::new(500.0, 100_000.0);
        assert!(filter.accept(&region(30, 30, 500.0)));
        assert!(filter.accept(&region(400, 400, 100_000.0)));
        assert_eq!(filter.classify(&region(20, 20, 499.9)), Verdict::TooSmall);
        assert_eq!(filter.classify(&region(400, 400, 100_000.1)), Verdict::TooLarge);
    }

    #[test]
    fn test_degenerate_regions_rejected() {
        let filter = GeometryFilter::new(0.0, 1_000.0);
        assert_eq!(filter.classify(&region(0, 10, 5.0)), Verdict::Degenerate);
        assert_eq!(filter.classify(&region(10, -3, 5.0)), Verdict::Degenerate);
        assert_eq!(filter.classify(&region(10, 10, 0.0)), Verdict::Degenerate);
        assert_eq!(filter.classify(&region(10, 10, f64::NAN)), Verdict::Degenerate);
        assert_eq!(filter.classify(&region(10, 10, f64::INFINITY)), Verdict::Degenerate);
    }

    #[test]
    fn test_negative_origin_rejected() {
        let filter = GeometryFilter::new(0.0, 1_000.0);
        let r = Region::new(BoundingBox::new(-1, 4, 10, 10), 50.0);
        assert!(!filter.accept(&r));
    }

    proptest! {
        #[test]
        fn prop_accept_matches_band(
            area in 0.01f64..200_000.0,
            min in 0.0f64..50_000.0,
            span in 0.0f64..100_000.0,
        ) {
            let max = min + span;
            let filter = GeometryFilter::new(min, max);
            let accepted = filter.accept(&region(10, 10, area));
            prop_assert_eq!(accepted, area >= min && area <= max);
        }
    }
}
