// Recovering the parameters of a linear congruential generator
//
//                  s_{n+1} = (m * s_n + c) mod p
//
// from consecutive outputs, knowing none of m, c, p or the seed.
//
// The differences t_n = s_{n+1} - s_n satisfy t_{n+1} = m * t_n (mod p), so
//
//                  t_{n+2} * t_n - t_{n+1}^2 = 0 (mod p).
//
// Each such value is a multiple of p and the gcd of a handful of them is p
// times some small factor. With p known, m = t_1 / t_0, then c and the seed
// follow by rearranging the recurrence.
use crate::prime::is_likely_prime;

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_traits::{Signed, Zero};
use thiserror::Error;

const MODULUS_MULTIPLE_SEARCH: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LcgError {
    #[error("need at least {needed} outputs, got {got}")]
    NotEnoughOutputs { needed: usize, got: usize },
    #[error("modulus is zero")]
    ZeroModulus,
    #[error("value is not invertible modulo the recovered modulus")]
    NotInvertible,
    #[error("no prime modulus of the requested size divides the recovered multiple")]
    ModulusNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcg {
    state: BigUint,
    multiplier: BigUint,
    increment: BigUint,
    modulus: BigUint,
}

impl Lcg {
    pub fn new(seed: BigUint, multiplier: BigUint, increment: BigUint, modulus: BigUint) -> Self {
        Self {
            state: seed,
            multiplier,
            increment,
            modulus,
        }
    }
}

impl Iterator for Lcg {
    type Item = BigUint;

    fn next(&mut self) -> Option<BigUint> {
        self.state = (&self.state * &self.multiplier + &self.increment) % &self.modulus;
        Some(self.state.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcgParameters {
    pub modulus: BigUint,
    pub multiplier: BigUint,
    pub increment: BigUint,
    pub seed: BigUint,
}

/// Recovers a multiple of the modulus. Needs at least five outputs; more
/// outputs make it likelier that the multiple is the modulus itself.
pub fn recover_modulus(outputs: &[BigUint]) -> Result<BigUint, LcgError> {
    require_outputs(outputs, 5)?;
    let outputs: Vec<BigInt> = outputs.iter().cloned().map(BigInt::from).collect();
    let diffs: Vec<BigInt> = outputs.windows(2).map(|s| &s[1] - &s[0]).collect();
    let multiple = diffs
        .windows(3)
        .map(|t| &t[2] * &t[0] - &t[1] * &t[1])
        .fold(BigInt::zero(), greatest_common_divisor);
    if multiple.is_zero() {
        return Err(LcgError::ModulusNotFound);
    }
    Ok(multiple.magnitude().clone())
}

pub fn recover_multiplier(outputs: &[BigUint], modulus: &BigUint) -> Result<BigUint, LcgError> {
    require_outputs(outputs, 3)?;
    require_modulus(modulus)?;
    let t0 = reduce(&(BigInt::from(outputs[1].clone()) - BigInt::from(outputs[0].clone())), modulus);
    let t1 = reduce(&(BigInt::from(outputs[2].clone()) - BigInt::from(outputs[1].clone())), modulus);
    let inverse = t0.modinv(modulus).ok_or(LcgError::NotInvertible)?;
    Ok(t1 * inverse % modulus)
}

pub fn recover_increment(
    outputs: &[BigUint],
    modulus: &BigUint,
    multiplier: &BigUint,
) -> Result<BigUint, LcgError> {
    require_outputs(outputs, 2)?;
    require_modulus(modulus)?;
    let c = BigInt::from(outputs[1].clone()) - BigInt::from(&outputs[0] * multiplier);
    Ok(reduce(&c, modulus))
}

/// The seed is the state before the first output.
pub fn recover_seed(
    first_output: &BigUint,
    modulus: &BigUint,
    multiplier: &BigUint,
    increment: &BigUint,
) -> Result<BigUint, LcgError> {
    require_modulus(modulus)?;
    let inverse = multiplier.modinv(modulus).ok_or(LcgError::NotInvertible)?;
    let shifted = reduce(
        &(BigInt::from(first_output.clone()) - BigInt::from(increment.clone())),
        modulus,
    );
    Ok(shifted * inverse % modulus)
}

/// Recovers every parameter, given the bit length of the (prime) modulus.
pub fn recover_parameters(
    outputs: &[BigUint],
    modulus_bits: u64,
    rng: &mut impl RandBigInt,
) -> Result<LcgParameters, LcgError> {
    let multiple = recover_modulus(outputs)?;
    let modulus = (1..MODULUS_MULTIPLE_SEARCH)
        .map(BigUint::from)
        .filter(|k| (&multiple % k).is_zero())
        .map(|k| &multiple / k)
        .find(|p| p.bits() == modulus_bits && is_likely_prime(p, rng))
        .ok_or(LcgError::ModulusNotFound)?;

    let multiplier = recover_multiplier(outputs, &modulus)?;
    let increment = recover_increment(outputs, &modulus, &multiplier)?;
    let seed = recover_seed(&outputs[0], &modulus, &multiplier, &increment)?;
    Ok(LcgParameters {
        modulus,
        multiplier,
        increment,
        seed,
    })
}

fn require_outputs(outputs: &[BigUint], needed: usize) -> Result<(), LcgError> {
    if outputs.len() < needed {
        return Err(LcgError::NotEnoughOutputs {
            needed,
            got: outputs.len(),
        });
    }
    Ok(())
}

fn require_modulus(modulus: &BigUint) -> Result<(), LcgError> {
    if modulus.is_zero() {
        return Err(LcgError::ZeroModulus);
    }
    Ok(())
}

fn reduce(x: &BigInt, modulus: &BigUint) -> BigUint {
    let modulus = BigInt::from(modulus.clone());
    (((x % &modulus) + &modulus) % &modulus).magnitude().clone()
}

fn greatest_common_divisor(a: BigInt, b: BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}
