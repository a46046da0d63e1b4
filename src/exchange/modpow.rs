//! Modular exponentiation over arbitrary-precision integers.
//!
//! Every public key and shared secret in the simulator is a single call to
//! [`mod_pow`]. All intermediates are `BigUint`, so the multi-thousand-bit
//! catalog entries are computed exactly.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

/// Computes `base^exponent mod modulus` by iterative square-and-multiply.
///
/// The base is reduced first. Each round multiplies the accumulator by the
/// running base when the low exponent bit is set, squares the base, and halves
/// the exponent, so the loop runs once per exponent bit.
///
/// # Errors
/// Returns [`Error::InvalidModulus`] when `modulus` is zero.
///
/// # Examples
/// ```
/// use dhsim::exchange::mod_pow;
/// use num_bigint::BigUint;
///
/// let r = mod_pow(&BigUint::from(5u32), &BigUint::from(6u32), &BigUint::from(23u32)).unwrap();
/// assert_eq!(r, BigUint::from(8u32));
/// ```
pub fn mod_pow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> Result<BigUint> {
    if modulus.is_zero() {
        return Err(Error::InvalidModulus("modulus cannot be zero".to_string()));
    }

    let mut result = BigUint::one() % modulus;
    let mut base = base % modulus;
    let mut exponent = exponent.clone();

    while !exponent.is_zero() {
        if exponent.is_odd() {
            result = (&result * &base) % modulus;
        }
        base = (&base * &base) % modulus;
        exponent >>= 1;
    }

    Ok(result)
}
