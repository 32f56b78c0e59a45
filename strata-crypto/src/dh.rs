//! Diffie-Hellman parameter validation for the auth key exchange.

use std::fmt;

use num_bigint::BigUint;
use num_traits::One;

/// Size of the server's DH prime.
pub const PRIME_BITS: u64 = 2048;

/// Distance that `g_a` and `g_b` must keep from both ends of `[1, p - 1]`.
pub const SAFETY_BITS: usize = 2048 - 64;

/// A DH parameter the server sent (or we generated) is unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DhError {
    /// The prime does not have exactly [`PRIME_BITS`] bits.
    PrimeSize { bits: u64 },
    /// The generator is outside the supported set or does not match the prime.
    Generator { g: u32 },
    /// `value` is not strictly between `low` and `high`.
    OutOfRange { value: BigUint, low: BigUint, high: BigUint },
}

impl fmt::Display for DhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimeSize { bits } => write!(f, "dh_prime has {bits} bits, expected {PRIME_BITS}"),
            Self::Generator { g } => write!(f, "unsupported generator g={g} for this prime"),
            Self::OutOfRange { value, low, high } => {
                write!(f, "dh value {value} outside ({low}, {high})")
            }
        }
    }
}

impl std::error::Error for DhError {}

/// Require a 2048-bit odd prime candidate.
///
/// Primality itself is not re-tested here; the server's prime is expected to
/// be one of a handful of well-known safe primes.
pub fn check_prime(p: &BigUint) -> Result<(), DhError> {
    let bits = p.bits();
    if bits != PRIME_BITS || !p.bit(0) {
        return Err(DhError::PrimeSize { bits });
    }
    Ok(())
}

/// Check `g` against the quadratic-residue conditions that make it generate
/// the large prime-order subgroup of a safe prime.
pub fn check_generator(g: u32, p: &BigUint) -> Result<(), DhError> {
    let rem = |m: u32| (p % m).try_into().unwrap_or(u32::MAX);
    let ok = match g {
        2 => rem(8) == 7,
        3 => rem(3) == 2,
        4 => true,
        5 => matches!(rem(5), 1 | 4),
        6 => matches!(rem(24), 19 | 23),
        7 => matches!(rem(7), 3 | 5 | 6),
        _ => false,
    };
    if ok { Ok(()) } else { Err(DhError::Generator { g }) }
}

/// Fail unless `low < value < high`.
pub fn check_range(value: &BigUint, low: &BigUint, high: &BigUint) -> Result<(), DhError> {
    if low < value && value < high {
        Ok(())
    } else {
        Err(DhError::OutOfRange {
            value: value.clone(),
            low: low.clone(),
            high: high.clone(),
        })
    }
}

/// Validate a public value (`g_a` or `g_b`): `1 < v < p - 1`, and at least
/// `2^(2048-64)` away from both ends.
pub fn check_public_value(value: &BigUint, p: &BigUint) -> Result<(), DhError> {
    let one = BigUint::one();
    let p_minus_one = p - &one;
    check_range(value, &one, &p_minus_one)?;

    let safety = BigUint::one() << SAFETY_BITS;
    if &safety >= p {
        return Err(DhError::PrimeSize { bits: p.bits() });
    }
    check_range(value, &safety, &(p - &safety))
}

/// `base^exp mod p`.
pub fn modpow(base: &BigUint, exp: &BigUint, p: &BigUint) -> BigUint {
    base.modpow(exp, p)
}

/// Big-endian bytes of `value`, left-padded with zeros to 256 bytes.
///
/// Values wider than 2048 bits keep their 256 least significant bytes.
pub fn to_bytes_256(value: &BigUint) -> [u8; 256] {
    let be = value.to_bytes_be();
    let mut out = [0u8; 256];
    let take = be.len().min(256);
    out[256 - take..].copy_from_slice(&be[be.len() - take..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIME: &str = "c71caeb9c6b1c9048e6c522f70f13f73980d40238e3e21c14934d037563d930f48198a0aa7c14058229493d22530f4dbfa336f6e0ac925139543aed44cce7c3720fd51f69458705ac68cd4fe6b6b13abdc9746512969328454f18faf8c595f642477fe96bb2a941d5bcd1d4ac8cc49880708fa9b378e3c4f3a9060bee67cf9a4a4a695811051907e162753b56b0f6b410dba74d8a84b2a14b3144e0ef1284754fd17ed950d5965b4b9dd46582db1178d169c6bc465b0d6ff9ca3928fef5b9ae4e418fc15e83ebea0f87fa9ff5eed70050ded2849f47bf959d956850ce929851f0d8115f635b105ee2e4e15d04b2454bf6f4fadf034b10403119cd8e3b92fcc5b";

    fn prime() -> BigUint {
        BigUint::parse_bytes(PRIME.as_bytes(), 16).unwrap()
    }

    #[test]
    fn telegram_prime_is_accepted() {
        assert!(check_prime(&prime()).is_ok());
    }

    #[test]
    fn short_prime_is_rejected() {
        let p = BigUint::from(0xffff_fffb_u32);
        assert_eq!(check_prime(&p), Err(DhError::PrimeSize { bits: 32 }));
    }

    #[test]
    fn generator_conditions() {
        let p = prime();
        assert!(check_generator(3, &p).is_ok());
        assert!(check_generator(4, &p).is_ok());
        assert!(check_generator(7, &p).is_ok());
        assert_eq!(check_generator(2, &p), Err(DhError::Generator { g: 2 }));
        assert_eq!(check_generator(9, &p), Err(DhError::Generator { g: 9 }));
    }

    #[test]
    fn public_value_bounds() {
        let p = prime();
        let one = BigUint::one();
        assert!(check_public_value(&one, &p).is_err());
        assert!(check_public_value(&(&p - &one), &p).is_err());
        // In (1, p - 1) but inside the low safety margin.
        assert!(check_public_value(&BigUint::from(12345u32), &p).is_err());

        let g_a = modpow(&BigUint::from(3u32), &BigUint::from(0x1234_5678_9abc_u64), &p);
        assert!(check_public_value(&g_a, &p).is_ok());
    }

    #[test]
    fn padding_to_256_bytes() {
        let out = to_bytes_256(&BigUint::from(0x0102u32));
        assert_eq!(out[..254], [0u8; 254]);
        assert_eq!(out[254..], [1, 2]);
        assert_eq!(to_bytes_256(&prime()).to_vec(), prime().to_bytes_be());
    }
}
