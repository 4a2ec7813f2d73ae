//! Read-only reference lookups for loading points, dumping points, haul roads
//! and the delay taxonomy.

use std::collections::BTreeMap;

use crate::models::{DelayReason, DumpingPoint, LoadingPoint, RoadSegment};

/// Read-only lookups consumed by the queue manager, assignment policy and
/// cycle runner.
pub trait ReferenceCatalog: Send + Sync {
    fn loading_point(&self, id: &str) -> Option<LoadingPoint>;

    /// All loading points, sorted by id
    fn loading_points(&self) -> Vec<LoadingPoint>;

    fn dumping_point(&self, id: &str) -> Option<DumpingPoint>;

    /// All dumping points, sorted by id
    fn dumping_points(&self) -> Vec<DumpingPoint>;

    fn road_segment(&self, id: &str) -> Option<RoadSegment>;

    /// All road segments, sorted by id
    fn road_segments(&self) -> Vec<RoadSegment>;

    /// Active delay reasons, sorted by id
    fn delay_reasons(&self) -> Vec<DelayReason>;

    /// Shortest road connecting a loading point to a dumping point
    fn shortest_road(&self, loading_point_id: &str, dumping_point_id: &str) -> Option<RoadSegment> {
        self.road_segments()
            .into_iter()
            .filter(|road| road.connects(loading_point_id, dumping_point_id))
            .min_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    loading_points: BTreeMap<String, LoadingPoint>,
    dumping_points: BTreeMap<String, DumpingPoint>,
    road_segments: BTreeMap<String, RoadSegment>,
    delay_reasons: BTreeMap<String, DelayReason>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loading_point(mut self, point: LoadingPoint) -> Self {
        self.loading_points.insert(point.id.clone(), point);
        self
    }

    pub fn with_dumping_point(mut self, point: DumpingPoint) -> Self {
        self.dumping_points.insert(point.id.clone(), point);
        self
    }

    pub fn with_road_segment(mut self, road: RoadSegment) -> Self {
        self.road_segments.insert(road.id.clone(), road);
        self
    }

    pub fn with_delay_reasons(mut self, reasons: impl IntoIterator<Item = DelayReason>) -> Self {
        for reason in reasons {
            self.delay_reasons.insert(reason.id.clone(), reason);
        }
        self
    }
}

impl ReferenceCatalog for InMemoryCatalog {
    fn loading_point(&self, id: &str) -> Option<LoadingPoint> {
        self.loading_points.get(id).cloned()
    }

    fn loading_points(&self) -> Vec<LoadingPoint> {
        self.loading_points.values().cloned().collect()
    }

    fn dumping_point(&self, id: &str) -> Option<DumpingPoint> {
        self.dumping_points.get(id).cloned()
    }

    fn dumping_points(&self) -> Vec<DumpingPoint> {
        self.dumping_points.values().cloned().collect()
    }

    fn road_segment(&self, id: &str) -> Option<RoadSegment> {
        self.road_segments.get(id).cloned()
    }

    fn road_segments(&self) -> Vec<RoadSegment> {
        self.road_segments.values().cloned().collect()
    }

    fn delay_reasons(&self) -> Vec<DelayReason> {
        self.delay_reasons
            .values()
            .filter(|reason| reason.is_active)
            .cloned()
            .collect()
    }
}
