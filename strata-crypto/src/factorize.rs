//! Brent's variant of Pollard's rho, used to split the server's `pq`.

use rand::Rng;

/// Iterations folded into one `gcd` call.
const BATCH: u64 = 128;
const ATTEMPTS: usize = 3;

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn step(y: u64, c: u64, n: u64) -> u64 {
    ((mul_mod(y, y, n) as u128 + c as u128) % n as u128) as u64
}

/// One run of Brent's cycle search from seed `y0` with increment `c`.
///
/// Returns a non-trivial factor, or `None` when the walk collapsed onto `n`.
fn brent(n: u64, y0: u64, c: u64) -> Option<u64> {
    let mut y = y0;
    let mut x = y0;
    let mut ys = y0;
    let mut g = 1;
    let mut q = 1;
    let mut r: u64 = 1;

    while g == 1 {
        x = y;
        for _ in 0..r {
            y = step(y, c, n);
        }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..BATCH.min(r - k) {
                y = step(y, c, n);
                q = mul_mod(q, x.abs_diff(y), n);
            }
            g = gcd(q, n);
            k += BATCH;
        }
        r *= 2;
    }

    if g == n {
        // The batch overshot; replay it one step at a time.
        loop {
            ys = step(ys, c, n);
            g = gcd(x.abs_diff(ys), n);
            if g > 1 {
                break;
            }
        }
    }

    (g != n).then_some(g)
}

/// Split `pq` into `(p, q)` with `p <= q`.
///
/// Returns `None` for inputs below 4 and when every attempt fails, which for
/// a product of two distinct primes is vanishingly rare.
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 {
        return None;
    }
    if pq % 2 == 0 {
        return Some((2, pq / 2));
    }

    let mut rng = rand::thread_rng();
    for _ in 0..ATTEMPTS {
        let y0 = rng.gen_range(1..pq);
        let c = rng.gen_range(1..pq);
        if let Some(p) = brent(pq, y0, c) {
            let q = pq / p;
            return Some((p.min(q), p.max(q)));
        }
    }
    None
}
