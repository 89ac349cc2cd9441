// Probabilistic primality testing and prime generation.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};

const MILLER_RABIN_ROUNDS: u32 = 20;
const SMALL_ODD_PRIMES: [u64; 24] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

pub fn is_likely_prime(candidate_prime: &BigUint, rng: &mut impl RandBigInt) -> bool {
    let two = BigUint::from(2u64);
    if candidate_prime < &two {
        return false;
    }
    if candidate_prime == &two {
        return true;
    }
    if (candidate_prime % &two).is_zero() {
        return false;
    }

    for small_prime in SMALL_ODD_PRIMES {
        let x = BigUint::from(small_prime);
        if candidate_prime == &x {
            return true;
        }
        if (candidate_prime % &x).is_zero() {
            return false;
        }
    }

    miller_rabin(candidate_prime, MILLER_RABIN_ROUNDS, rng)
}

/// A random prime of exactly `n_bits` bits.
pub fn generate_prime(n_bits: u64, rng: &mut impl RandBigInt) -> BigUint {
    loop {
        let mut candidate = rng.gen_biguint(n_bits);
        candidate.set_bit(n_bits - 1, true);
        candidate.set_bit(0, true);
        if is_likely_prime(&candidate, rng) {
            return candidate;
        }
    }
}

fn miller_rabin(candidate_prime: &BigUint, n_rounds: u32, rng: &mut impl RandBigInt) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u64);
    let minus_one = candidate_prime - &one;

    // candidate - 1 = d * 2^r with d odd.
    let r = minus_one.trailing_zeros().unwrap_or(0);
    let d = &minus_one >> r;

    'witness: for _ in 0..n_rounds {
        let a = rng.gen_biguint_range(&two, &minus_one);
        let mut x = a.modpow(&d, candidate_prime);
        if x == one || x == minus_one {
            continue;
        }
        for _ in 1..r {
            x = x.modpow(&two, candidate_prime);
            if x == minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}
