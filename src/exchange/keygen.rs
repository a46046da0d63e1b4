//! DISCLAIMER: private keys drawn here are for the simulator *EXCLUSIVELY*.
//! Each draw carries at most 53 bits of entropy from a seedable PRNG, which is
//! nowhere near enough for a real key. Absolutely DO NOT use these keys for
//! real cryptographic or security-sensitive operations.
//!
//! The limited draw is kept on purpose: it reproduces the simulator's
//! documented demo behaviour, and a seeded config makes runs repeatable.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Exclusive upper bound of a raw draw, `2^53 - 1`.
pub const MAX_DRAW: u64 = (1 << 53) - 1;

/// Configuration for private key generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyGenConfig {
    /// Optional RNG seed for reproducible simulations.
    pub seed: Option<u64>,
}

/// Draws private keys in `[1, p - 2]`.
///
/// *This is for demonstration only. DO NOT use in real systems.*
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    rng: StdRng,
}

impl KeyGenerator {
    /// Seeded from `config.seed` when present, from OS entropy otherwise.
    pub fn new(config: &KeyGenConfig) -> Self {
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        KeyGenerator { rng }
    }

    /// Draw a private key for modulus `p`, uniformly reduced into `[1, p - 2]`.
    ///
    /// # Errors
    /// [`Error::InvalidModulus`] when `p < 3`, since the range would be empty.
    pub fn generate(&mut self, p: &BigUint) -> Result<BigUint> {
        if *p < BigUint::from(3u32) {
            return Err(Error::InvalidModulus(format!(
                "modulus {p} leaves no private key in [1, p - 2]"
            )));
        }
        let max = p - 2u32;
        let draw = self.rng.gen_range(0..MAX_DRAW);
        Ok(BigUint::from(draw) % &max + 1u32)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(&KeyGenConfig::default())
    }
}

/// Draw a single private key from an entropy-seeded generator.
pub fn generate_private_key(p: &BigUint) -> Result<BigUint> {
    KeyGenerator::default().generate(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::params::catalog;
    use num_traits::One;
    use std::collections::HashSet;

    #[test]
    fn test_bounds_for_every_catalog_entry() {
        let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(7) });
        for params in catalog() {
            let upper = &params.p - 2u32;
            for _ in 0..500 {
                let key = keygen.generate(&params.p).unwrap();
                assert!(key >= BigUint::one(), "{}: key below 1", params.name);
                assert!(key <= upper, "{}: key above p - 2", params.name);
            }
        }
    }

    #[test]
    fn test_toy_modulus_reaches_both_ends() {
        let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(42) });
        let p = BigUint::from(23u32);
        let seen: HashSet<BigUint> = (0..2000).map(|_| keygen.generate(&p).unwrap()).collect();
        assert_eq!(seen.len(), 21);
        assert!(seen.contains(&BigUint::from(1u32)));
        assert!(seen.contains(&BigUint::from(21u32)));
        assert!(!seen.contains(&BigUint::from(22u32)));
    }

    #[test]
    fn test_smallest_usable_modulus() {
        let key = generate_private_key(&BigUint::from(3u32)).unwrap();
        assert_eq!(key, BigUint::one());
    }

    #[test]
    fn test_rejects_tiny_modulus() {
        for p in 0u32..3 {
            let err = generate_private_key(&BigUint::from(p)).unwrap_err();
            assert!(matches!(err, Error::InvalidModulus(_)));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = KeyGenConfig { seed: Some(2024) };
        let p = catalog()[3].p.clone();
        let a: Vec<_> = {
            let mut keygen = KeyGenerator::new(&config);
            (0..5).map(|_| keygen.generate(&p).unwrap()).collect()
        };
        let b: Vec<_> = {
            let mut keygen = KeyGenerator::new(&config);
            (0..5).map(|_| keygen.generate(&p).unwrap()).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_draw_width_is_limited() {
        let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(1) });
        let p = catalog()[3].p.clone();
        for _ in 0..100 {
            assert!(keygen.generate(&p).unwrap().bits() <= 53);
        }
    }
}
