//! Shared fixtures for unit tests: the production shape set and seeded
//! random tensor builders.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::shape::ConvShape;

/// Grouped 3x3 production shapes; the last two are from resnext101-32x4d.
/// All of these hit the specialized 3x3/stride-1 kernel.
pub fn test_shapes() -> Vec<ConvShape> {
    vec![
        ConvShape::new(1, 32, 32, [3, 3], 8, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 32, 32, [4, 4], 8, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 32, 32, [3, 5], 8, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 32, 32, [5, 3], 8, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 8, 8, [5, 5], 2, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 128, 128, [56, 48], 32, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 128, 128, [48, 56], 32, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(1, 128, 128, [56, 56], 32, [3, 3], [1, 1], [1, 1, 1, 1]),
        ConvShape::new(2, 128, 128, [56, 56], 32, [3, 3], [1, 1], [1, 1, 1, 1]),
    ]
}

/// Shapes that miss every specialized kernel: strides, odd kernels,
/// asymmetric padding. These must flow through the generic fallback.
pub fn generic_shapes() -> Vec<ConvShape> {
    vec![
        ConvShape::new(1, 32, 32, [7, 7], 8, [3, 3], [2, 2], [1, 1, 1, 1]),
        ConvShape::new(1, 16, 16, [4, 4], 4, [1, 1], [1, 1], [0, 0, 0, 0]),
        ConvShape::new(1, 16, 16, [6, 6], 4, [5, 5], [1, 1], [2, 2, 2, 2]),
        ConvShape::new(2, 8, 8, [5, 4], 2, [3, 3], [1, 1], [1, 0, 2, 1]),
    ]
}

/// The cheap-to-run set, for tests sweeping large parameter grids.
pub fn small_shapes() -> Vec<ConvShape> {
    let mut shapes: Vec<ConvShape> = test_shapes().into_iter().take(5).collect();
    shapes.extend(generic_shapes());
    shapes
}

pub fn random_u8(len: usize, lo: u8, hi: u8, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(lo..=hi)).collect()
}

pub fn random_i8(len: usize, lo: i8, hi: i8, seed: u64) -> Vec<i8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(lo..=hi)).collect()
}

pub fn random_i32(len: usize, lo: i32, hi: i32, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(lo..=hi)).collect()
}

pub fn random_f32(len: usize, lo: f32, hi: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(lo..hi)).collect()
}
