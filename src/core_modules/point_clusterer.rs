// THEORY:
// The `PointClusterer` is the engine of the spatial grouping layer. It grows
// regions over a cloud of candidate points in an annulus rather than over a
// rectangular grid, so "adjacent" means "closer than the cluster radius under
// the periodic-aware metric".
//
// Key architectural principles & algorithm steps:
// 1.  **Connected Components**: A cluster is the transitive closure of the
//     "closer than radius" relation, found with a breadth-first flood fill. Two
//     points far apart still share a cluster if a chain of close points joins them.
// 2.  **Periodic Awareness**: All adjacency tests go through `DomainMetric`, so a
//     front straddling θ = 0 is one cluster, not two.
// 3.  **Order Invariance**: Members are sorted and clusters are ordered by their
//     first member, so the same set of points always yields the same partition
//     in the same order, however the input was permuted.
// 4.  **Bucket Index**: Above a few hundred points the all-pairs scan is replaced
//     by angular buckets sized so that every neighbour is in the same or an
//     adjacent bucket.
// 5.  **Stateless Utility**: No memory of earlier steps.

use crate::core_modules::front_extractor::CandidatePoint;
use crate::core_modules::geometry::DomainMetric;

pub mod point_clusterer {
    use super::*;
    use std::cmp::Ordering;
    use std::collections::VecDeque;
    use std::f64::consts::TAU;

    /// Point count above which the angular bucket index is used.
    const BUCKET_INDEX_THRESHOLD: usize = 256;

    /// Partitions `points` into connected clusters under `metric`.
    pub fn cluster_points<M: DomainMetric>(
        points: &[CandidatePoint],
        radius: f64,
        metric: &M,
    ) -> Vec<Vec<CandidatePoint>> {
        if points.is_empty() {
            return Vec::new();
        }

        let index = NeighbourIndex::build(points, radius);
        let mut visited = vec![false; points.len()];
        let mut clusters: Vec<Vec<CandidatePoint>> = Vec::new();

        for seed in 0..points.len() {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            let mut members = Vec::new();
            let mut queue = VecDeque::from([seed]);

            while let Some(current) = queue.pop_front() {
                members.push(points[current]);
                for other in index.candidates(current) {
                    if !visited[other]
                        && metric.distance(&points[current].coordinate, &points[other].coordinate) < radius
                    {
                        visited[other] = true;
                        queue.push_back(other);
                    }
                }
            }

            members.sort_by(compare_points);
            clusters.push(members);
        }

        clusters.sort_by(|a, b| compare_points(&a[0], &b[0]));
        clusters
    }

    fn compare_points(a: &CandidatePoint, b: &CandidatePoint) -> Ordering {
        a.sample_index
            .cmp(&b.sample_index)
            .then_with(|| a.coordinate.theta.total_cmp(&b.coordinate.theta))
            .then_with(|| a.coordinate.r.total_cmp(&b.coordinate.r))
            .then_with(|| a.coordinate.z.total_cmp(&b.coordinate.z))
    }

    /// Restricts which pairs are distance-tested. Both variants must return every
    /// point that could possibly lie within the radius.
    enum NeighbourIndex {
        AllPairs(usize),
        AngularBuckets { bucket_of: Vec<usize>, buckets: Vec<Vec<usize>> },
    }

    impl NeighbourIndex {
        fn build(points: &[CandidatePoint], radius: f64) -> Self {
            let n = points.len();
            let min_radius = points.iter().map(|p| p.coordinate.r).fold(f64::INFINITY, f64::min);
            if n <= BUCKET_INDEX_THRESHOLD || !(min_radius > 0.0) || !(radius > 0.0) {
                return Self::AllPairs(n);
            }

            // Any pair closer than `radius` differs in angle by less than
            // radius / r_min, so that is the narrowest safe bucket width. Wider
            // buckets stay safe, so the count is capped at one bucket per point.
            let max_angle = radius / min_radius;
            let bucket_count = ((TAU / max_angle).floor() as usize).min(n);
            if bucket_count < 3 {
                return Self::AllPairs(n);
            }

            let mut buckets = vec![Vec::new(); bucket_count];
            let bucket_of: Vec<usize> = points
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let b = ((p.coordinate.theta / TAU) * bucket_count as f64) as usize % bucket_count;
                    buckets[b].push(i);
                    b
                })
                .collect();

            Self::AngularBuckets { bucket_of, buckets }
        }

        fn candidates(&self, point: usize) -> Vec<usize> {
            match self {
                Self::AllPairs(n) => (0..*n).filter(|&j| j != point).collect(),
                Self::AngularBuckets { bucket_of, buckets } => {
                    let count = buckets.len();
                    let b = bucket_of[point];
                    [(b + count - 1) % count, b, (b + 1) % count]
                        .iter()
                        .flat_map(|&nb| buckets[nb].iter().copied())
                        .filter(|&j| j != point)
                        .collect()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::point_clusterer::cluster_points;
    use crate::core_modules::front_extractor::CandidatePoint;
    use crate::core_modules::geometry::{Coordinate, Cylindrical3D, Polar2D};
    use std::f64::consts::TAU;

    fn point(index: usize, r: f64, theta: f64) -> CandidatePoint {
        CandidatePoint { sample_index: index, coordinate: Coordinate::polar(r, theta), value: 3000.0, metric: 3000.0 }
    }

    fn canonical(clusters: &[Vec<CandidatePoint>]) -> Vec<Vec<usize>> {
        clusters.iter().map(|c| c.iter().map(|p| p.sample_index).collect()).collect()
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(cluster_points(&[], 0.005, &Polar2D).is_empty());
    }

    #[test]
    fn chain_forms_single_component() {
        // Consecutive points are 0.0039 apart, ends are far apart.
        let points: Vec<_> = (0..10).map(|i| point(i, 0.065, 0.06 * i as f64)).collect();
        let clusters = cluster_points(&points, 0.005, &Polar2D);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 10);
    }

    #[test]
    fn cluster_spans_the_wrap() {
        let points = vec![
            point(0, 0.065, TAU - 0.03),
            point(1, 0.065, 0.0),
            point(2, 0.065, 0.03),
            point(3, 0.065, 3.0),
        ];
        let clusters = cluster_points(&points, 0.005, &Polar2D);
        assert_eq!(canonical(&clusters), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn partition_is_permutation_invariant() {
        let mut points: Vec<_> = (0..12)
            .map(|i| point(i, 0.06 + 0.001 * (i % 3) as f64, 0.5 * (i / 3) as f64 + 0.02 * (i % 3) as f64))
            .collect();
        let expected = canonical(&cluster_points(&points, 0.005, &Polar2D));

        points.reverse();
        assert_eq!(canonical(&cluster_points(&points, 0.005, &Polar2D)), expected);

        points.rotate_left(5);
        assert_eq!(canonical(&cluster_points(&points, 0.005, &Polar2D)), expected);
        assert_eq!(expected.len(), 4);
    }

    #[test]
    fn bucket_index_matches_all_pairs() {
        // Enough points to switch to the bucket index; three bands of fronts.
        let mut points = Vec::new();
        for i in 0..600 {
            let band = i % 3;
            let theta = 2.0 * band as f64 + 0.0005 * (i / 3) as f64;
            points.push(point(i, 0.065, theta));
        }
        let clusters = cluster_points(&points, 0.005, &Polar2D);
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| c.len() == 200));
    }

    #[test]
    fn tiny_radius_keeps_the_bucket_index_bounded() {
        // 300 points 0.02 rad apart: above the bucket threshold, with a radius
        // whose natural bucket count would be astronomically large.
        let points: Vec<_> = (0..300).map(|i| point(i, 0.065, 0.02 * i as f64)).collect();
        let isolated = cluster_points(&points, 1e-10, &Polar2D);
        assert_eq!(isolated.len(), 300);
        assert!(isolated.iter().all(|c| c.len() == 1));

        // Neighbours are 0.0013 m apart, so a 0.002 radius chains them all.
        let chained = cluster_points(&points, 0.002, &Polar2D);
        assert_eq!(chained.len(), 1);
        assert_eq!(chained[0].len(), 300);
    }

    #[test]
    fn axial_separation_splits_clusters_in_3d() {
        let a = CandidatePoint {
            sample_index: 0,
            coordinate: Coordinate::cylindrical(0.065, 1.0, 0.0),
            value: 1.0,
            metric: 1.0,
        };
        let b = CandidatePoint { sample_index: 1, coordinate: Coordinate::cylindrical(0.065, 1.0, 0.05), ..a };
        assert_eq!(cluster_points(&[a, b], 0.005, &Cylindrical3D).len(), 2);
        assert_eq!(cluster_points(&[a, b], 0.005, &Polar2D).len(), 1);
    }
}
