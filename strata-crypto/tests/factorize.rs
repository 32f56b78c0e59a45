use proptest::prelude::*;
use strata_crypto::factorize;

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

fn next_prime(mut n: u64) -> u64 {
    while !is_prime(n) {
        n += 1;
    }
    n
}

#[test]
fn server_sized_products() {
    let cases = [
        (1206429347u64, 1218991343u64),
        (1229739323, 1402015859),
        (1518968219, 1556064227),
    ];
    for (p, q) in cases {
        assert_eq!(factorize(p * q), Some((p, q)));
    }
}

#[test]
fn small_products() {
    assert_eq!(factorize(15), Some((3, 5)));
    assert_eq!(factorize(77), Some((7, 11)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn splits_products_of_distinct_32_bit_primes(a in (1u64 << 30)..(1u64 << 32), b in (1u64 << 30)..(1u64 << 32)) {
        let p = next_prime(a);
        let q = next_prime(b);
        prop_assume!(p != q && p < (1 << 32) && q < (1 << 32));

        let (lo, hi) = factorize(p * q).expect("factorization failed");
        prop_assert_eq!((lo, hi), (p.min(q), p.max(q)));
    }
}
