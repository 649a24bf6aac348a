//! Scene-scoped identity assignment for detected animals.
//!
//! A matcher decides, from the boxes already seen in the scene, which
//! identity a new box belongs to. The default matcher compares box centers;
//! an embedding-based matcher can replace it behind [`IdentityMatcher`]
//! without touching segmentation or aggregation.

use std::collections::BTreeSet;

use crate::detection::BoundingBox;

/// Every box that opened a new identity in the current scene, in order.
#[derive(Debug, Clone, Default)]
pub struct IdentityHistory {
    seen_boxes: Vec<BoundingBox>,
    identity_count: u32,
}

impl IdentityHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_boxes(&self) -> &[BoundingBox] {
        &self.seen_boxes
    }

    pub fn identity_count(&self) -> u32 {
        self.identity_count
    }

    /// Record a box as a new identity and return its id.
    pub fn register(&mut self, bbox: BoundingBox) -> u32 {
        self.seen_boxes.push(bbox);
        self.identity_count += 1;
        self.identity_count
    }
}

pub trait IdentityMatcher {
    /// Identity for `new_box`, registering it in `history` when it is new.
    fn assign(&self, history: &mut IdentityHistory, new_box: &BoundingBox) -> u32;
}

/// Greedy match by scan order: the first seen box whose center lies strictly
/// closer than `max_distance` pixels wins, even if a later one is closer.
#[derive(Debug, Clone, Copy)]
pub struct CenterDistanceMatcher {
    max_distance: f64,
}

impl CenterDistanceMatcher {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }
}

impl Default for CenterDistanceMatcher {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl IdentityMatcher for CenterDistanceMatcher {
    fn assign(&self, history: &mut IdentityHistory, new_box: &BoundingBox) -> u32 {
        let matched = history
            .seen_boxes()
            .iter()
            .position(|seen| seen.center_distance(new_box) < self.max_distance);

        match matched {
            // The matched box is not replaced; the scan always compares
            // against the box that first opened the identity.
            Some(index) => index as u32 + 1,
            None => history.register(*new_box),
        }
    }
}

/// Identity state for the scene currently being built.
#[derive(Debug, Clone)]
pub struct IdentityTracker<M> {
    matcher: M,
    history: IdentityHistory,
}

impl<M: IdentityMatcher> IdentityTracker<M> {
    pub fn new(matcher: M) -> Self {
        Self {
            matcher,
            history: IdentityHistory::new(),
        }
    }

    pub fn assign(&mut self, bbox: &BoundingBox) -> u32 {
        self.matcher.assign(&mut self.history, bbox)
    }

    /// Forget all identities; called when a new scene opens.
    pub fn reset(&mut self) {
        self.history = IdentityHistory::new();
    }

    pub fn history(&self) -> &IdentityHistory {
        &self.history
    }
}

/// Number of distinct identities among one photo's detections.
pub fn distinct_identities(identity_ids: &[u32]) -> u32 {
    identity_ids.iter().collect::<BTreeSet<_>>().len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(cx: i32, cy: i32) -> BoundingBox {
        BoundingBox::new(cx - 10, cy - 10, cx + 10, cy + 10)
    }

    #[test]
    fn test_new_boxes_get_increasing_ids() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        assert_eq!(tracker.assign(&at(100, 100)), 1);
        assert_eq!(tracker.assign(&at(300, 100)), 2);
        assert_eq!(tracker.assign(&at(100, 400)), 3);
        assert_eq!(tracker.history().identity_count(), 3);
    }

    #[test]
    fn test_close_box_reuses_identity_and_is_not_recorded() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        tracker.assign(&at(100, 100));
        tracker.assign(&at(300, 100));

        assert_eq!(tracker.assign(&at(330, 130)), 2);
        assert_eq!(tracker.history().seen_boxes().len(), 2);
        // Still measured against the original box, not the latest sighting
        assert_eq!(tracker.history().seen_boxes()[1], at(300, 100));
    }

    #[test]
    fn test_distance_threshold_is_strict() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        tracker.assign(&at(100, 100));
        // 30-40-50 triangle: exactly 50px away
        assert_eq!(tracker.assign(&at(130, 140)), 2);
        assert_eq!(tracker.assign(&at(129, 140)), 1);
    }

    #[test]
    fn test_first_match_in_scan_order_wins() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        tracker.assign(&at(100, 100));
        tracker.assign(&at(160, 100));

        // 45px from identity 1, 15px from identity 2
        assert_eq!(tracker.assign(&at(145, 100)), 1);
    }

    #[test]
    fn test_reset_starts_ids_at_one() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        tracker.assign(&at(100, 100));
        tracker.assign(&at(400, 100));
        tracker.reset();

        assert_eq!(tracker.history().identity_count(), 0);
        assert_eq!(tracker.assign(&at(400, 100)), 1);
    }

    #[test]
    fn test_ids_form_contiguous_range() {
        let mut tracker = IdentityTracker::new(CenterDistanceMatcher::default());
        let centers = [(10, 10), (500, 10), (20, 15), (900, 900), (505, 30), (10, 700)];
        let ids: Vec<u32> = centers.iter().map(|&(x, y)| tracker.assign(&at(x, y))).collect();

        let distinct: BTreeSet<u32> = ids.iter().copied().collect();
        let n = tracker.history().identity_count();
        assert_eq!(distinct, (1..=n).collect::<BTreeSet<u32>>());
        assert_eq!(n, 4);
    }

    #[test]
    fn test_distinct_identities() {
        assert_eq!(distinct_identities(&[]), 0);
        assert_eq!(distinct_identities(&[1, 1, 2, 1]), 2);
    }
}
