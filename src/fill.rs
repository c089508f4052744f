//! Fill rules for sample arrays.
//!
//! Closed-form sequences follow NumPy's `arange`/`linspace` arithmetic so the
//! values are bit-identical to what the viewer's Python fixtures would hold.
//! Random fills draw from a caller-supplied RNG; the generator seeds it.

use rand::Rng;

/// Evenly spaced values in `[start, stop)` advancing by `step`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step == 0.0 || !step.is_finite() {
        return Vec::new();
    }
    let len = ((stop - start) / step).ceil();
    if len.is_nan() || len <= 0.0 {
        return Vec::new();
    }
    (0..len as usize).map(|i| start + i as f64 * step).collect()
}

/// `num` evenly spaced values over `[start, stop]`, endpoint included.
///
/// Matches NumPy: `i * step + start`, with the last element pinned to `stop`.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut values: Vec<f64> = (0..num).map(|i| i as f64 * step + start).collect();
            if let Some(last) = values.last_mut() {
                *last = stop;
            }
            values
        }
    }
}

/// Uniform samples in `[0, 1)`.
pub fn uniform_f32<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<f32> {
    (0..count).map(|_| rng.gen::<f32>()).collect()
}

/// Uniform integers in `[low, high)`.
pub fn uniform_i32<R: Rng + ?Sized>(rng: &mut R, low: i32, high: i32, count: usize) -> Vec<i32> {
    (0..count).map(|_| rng.gen_range(low..high)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_arange_half_steps() {
        let values = arange(0.0, 10.0, 0.5);
        assert_eq!(values.len(), 20);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 0.5);
        assert_eq!(values[19], 9.5);
    }

    #[test]
    fn test_arange_integer_steps() {
        let values = arange(0.0, 100.0, 1.0);
        assert_eq!(values.len(), 100);
        assert!(values.iter().enumerate().all(|(i, v)| *v == i as f64));
    }

    #[test]
    fn test_arange_degenerate_ranges_are_empty() {
        assert!(arange(5.0, 1.0, 1.0).is_empty());
        assert!(arange(0.0, 1.0, 0.0).is_empty());
    }

    #[test]
    fn test_linspace_pins_endpoints() {
        let values = linspace(0.0, 1.0, 50);
        assert_eq!(values.len(), 50);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[49], 1.0);
        assert_eq!(values[1], 1.0 / 49.0);
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_linspace_small_counts() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(3.0, 7.0, 1), vec![3.0]);
        assert_eq!(linspace(3.0, 7.0, 2), vec![3.0, 7.0]);
    }

    #[test]
    fn test_uniform_f32_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let values = uniform_f32(&mut rng, 1_000);
        assert_eq!(values.len(), 1_000);
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_uniform_i32_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let values = uniform_i32(&mut rng, 0, 100, 1_000);
        assert!(values.iter().all(|v| (0..100).contains(v)));
    }

    #[test]
    fn test_seeded_fills_repeat() {
        let first = uniform_f32(&mut StdRng::seed_from_u64(42), 24);
        let second = uniform_f32(&mut StdRng::seed_from_u64(42), 24);
        assert_eq!(first, second);
    }
}
