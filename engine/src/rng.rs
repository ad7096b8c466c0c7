//! The game random number generator.
//!
//! A single seeded generator behind a mutex. The engine itself only touches
//! it from the engine thread, but seeding and the occasional diagnostic draw
//! can come from elsewhere, so the lock stays.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub struct GameRng {
    inner: Mutex<StdRng>,
}

impl GameRng {
    /// Seeds from OS entropy.
    pub fn from_entropy() -> Self {
        GameRng {
            inner: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Seeds from caller-supplied bytes, for deterministic replays. The bytes
    /// are folded into the fixed-size seed the generator wants.
    pub fn from_seed_bytes(bytes: &[u8]) -> Self {
        let mut seed = [0u8; 32];
        for (i, b) in bytes.iter().enumerate() {
            seed[i % 32] ^= *b;
        }
        GameRng {
            inner: Mutex::new(StdRng::from_seed(seed)),
        }
    }

    /// A uniform draw in `[0, 1)`.
    pub fn u01(&self) -> f32 {
        self.inner.lock().unwrap().random::<f32>()
    }

    /// True with probability `p` (clamped to `[0, 1]`).
    pub fn get_bool(&self, p: f32) -> bool {
        self.u01() < p
    }

    /// A uniform integer in `[a, b)`. An empty range is a programmer error.
    pub fn get_int(&self, a: i32, b: i32) -> i32 {
        assert!(a < b, "GameRng::get_int: empty range {a}..{b}");
        self.inner.lock().unwrap().random_range(a..b)
    }

    /// A uniform float in `[a, b)`. An empty range is a programmer error.
    pub fn get_float(&self, a: f32, b: f32) -> f32 {
        assert!(a < b, "GameRng::get_float: empty range {a}..{b}");
        self.inner.lock().unwrap().random_range(a..b)
    }

    /// Fisher-Yates shuffle of a slice.
    pub fn shuffle<T>(&self, slice: &mut [T]) {
        let mut rng = self.inner.lock().unwrap();
        for i in (1..slice.len()).rev() {
            let j = rng.random_range(0..=i);
            slice.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_draws_are_reproducible() {
        let a = GameRng::from_seed_bytes(b"replay-seed");
        let b = GameRng::from_seed_bytes(b"replay-seed");
        for _ in 0..32 {
            assert_eq!(a.get_int(0, 1000), b.get_int(0, 1000));
        }
    }

    #[test]
    fn int_draws_stay_in_range() {
        let rng = GameRng::from_seed_bytes(b"range");
        for _ in 0..200 {
            let v = rng.get_int(3, 7);
            assert!((3..7).contains(&v));
        }
    }

    #[test]
    fn u01_stays_in_range() {
        let rng = GameRng::from_seed_bytes(b"u01");
        for _ in 0..200 {
            let v = rng.u01();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn shuffle_keeps_elements() {
        let rng = GameRng::from_seed_bytes(b"shuffle");
        let mut v: Vec<i32> = (0..16).collect();
        rng.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }
}
