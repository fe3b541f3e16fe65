//! Seed selection for consolidation.
//!
//! Consolidation starts from a subset of the reference cloud. Every sampler
//! returns `min(count, points.len())` points in the order they were picked.
//!
//! - [`random_subsample`]: uniform random subset, reproducible from a seed
//! - [`stride_subsample`]: every n-th point, deterministic
//! - [`farthest_point_sample`]: greedy max-min spacing, evenly spread

use nalgebra::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Pick `count` distinct points uniformly at random.
///
/// The same `seed` always gives the same subset. Picked points keep their
/// relative order from the input.
pub fn random_subsample(points: &[Point3<f64>], count: usize, seed: u64) -> Vec<Point3<f64>> {
    let count = count.min(points.len());
    if count == 0 {
        return Vec::new();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, points.len(), count).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| points[i]).collect()
}

/// Pick `count` points at evenly spaced indices.
pub fn stride_subsample(points: &[Point3<f64>], count: usize) -> Vec<Point3<f64>> {
    let count = count.min(points.len());
    if count == 0 {
        return Vec::new();
    }
    let step = points.len() as f64 / count as f64;
    (0..count)
        .map(|i| points[((i as f64 * step) as usize).min(points.len() - 1)])
        .collect()
}

/// Greedy farthest-point sampling starting from the first point.
///
/// Each pick is the point farthest from everything picked so far. Stops
/// early if only duplicates of picked points remain.
pub fn farthest_point_sample(points: &[Point3<f64>], count: usize) -> Vec<Point3<f64>> {
    let count = count.min(points.len());
    if count == 0 {
        return Vec::new();
    }

    let mut picked = vec![false; points.len()];
    let mut distances = vec![f64::INFINITY; points.len()];
    let mut selected = Vec::with_capacity(count);
    let mut last = 0;

    loop {
        picked[last] = true;
        selected.push(points[last]);
        if selected.len() == count {
            break;
        }

        let origin = points[last];
        let mut farthest = None;
        let mut farthest_dist = 0.0_f64;
        for (i, dist) in distances.iter_mut().enumerate() {
            *dist = dist.min((points[i] - origin).norm());
            if !picked[i] && *dist > farthest_dist {
                farthest_dist = *dist;
                farthest = Some(i);
            }
        }

        match farthest {
            Some(i) => last = i,
            None => break,
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Point3<f64>> {
        (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_random_subsample_is_reproducible() {
        let points = line(100);
        let a = random_subsample(&points, 20, 7);
        let b = random_subsample(&points, 20, 7);
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert_ne!(a, random_subsample(&points, 20, 8));

        // Distinct and in input order.
        assert!(a.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn test_counts_are_clamped() {
        let points = line(5);
        assert_eq!(random_subsample(&points, 50, 1).len(), 5);
        assert_eq!(stride_subsample(&points, 50).len(), 5);
        assert_eq!(farthest_point_sample(&points, 50).len(), 5);

        assert!(random_subsample(&points, 0, 1).is_empty());
        assert!(stride_subsample(&[], 3).is_empty());
        assert!(farthest_point_sample(&[], 3).is_empty());
    }

    #[test]
    fn test_stride_subsample() {
        let picked = stride_subsample(&line(10), 5);
        let xs: Vec<f64> = picked.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_farthest_point_sample_spreads() {
        let picked = farthest_point_sample(&line(11), 3);
        let xs: Vec<f64> = picked.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 10.0, 5.0]);
    }

    #[test]
    fn test_farthest_point_sample_stops_on_duplicates() {
        let points = vec![Point3::origin(); 4];
        assert_eq!(farthest_point_sample(&points, 3).len(), 1);
    }
}
