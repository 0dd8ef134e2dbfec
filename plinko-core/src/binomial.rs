//! Derandomized binomial sampling for the PMNS tree.
//!
//! Every internal PMNS node needs one draw from `Binomial(count,
//! left_bins/total_bins)` that both the forward and the inverse descent
//! reproduce exactly, so the sampler is a pure function of the trial
//! count, the rational probability, and one PRF word.
//!
//! Small trial counts use exact inverse-CDF inversion; the common
//! `p = 1/2` splits additionally hit a precomputed table built with the
//! same pmf recurrence, so the fast path is bit-identical to the loop.
//! Large counts fall back to the normal approximation with a probit from
//! the inverse error function.

use once_cell::sync::Lazy;

/// Largest trial count handled by exact CDF inversion.
const EXACT_MAX_COUNT: u64 = 50;

/// Scales a PRF word into the open unit interval using the 53-bit
/// mantissa of an `f64`.
const INV_TWO_TO_53: f64 = 1.0 / (1u64 << 53) as f64;

/// CDF tables for `Binomial(n, 1/2)`, `n = 0..=EXACT_MAX_COUNT`.
/// `HALF_CDF[n][k] = P(X <= k)`.
static HALF_CDF: Lazy<Vec<Vec<f64>>> = Lazy::new(|| {
    (0..=EXACT_MAX_COUNT as usize)
        .map(|n| {
            if n == 0 {
                return vec![1.0];
            }
            let mut prob = 0.5f64.powi(n as i32);
            let mut cdf = Vec::with_capacity(n + 1);
            let mut cum = prob;
            cdf.push(cum);
            for k in 0..n as u64 {
                prob = prob * (n as u64 - k) as f64 / (k + 1) as f64;
                cum += prob;
                cdf.push(cum);
            }
            cdf
        })
        .collect()
});

/// Maps a PRF output word to `u ∈ (0, 1)`.
pub fn unit_open(prf_word: u64) -> f64 {
    ((prf_word >> 11) as f64 + 0.5) * INV_TWO_TO_53
}

/// Draws from `Binomial(count, num/denom)` deterministically from one
/// PRF word. The result is always in `[0, count]`.
pub fn sample(count: u64, num: u64, denom: u64, prf_word: u64) -> u64 {
    if denom == 0 || num == 0 || count == 0 {
        return 0;
    }
    if num >= denom {
        return count;
    }

    let u = unit_open(prf_word);
    let p = num as f64 / denom as f64;
    if count <= EXACT_MAX_COUNT {
        if num * 2 == denom {
            return lookup_half(count, u);
        }
        return exact_inverse_cdf(count, p, u);
    }
    normal_approx(count, p, u)
}

fn lookup_half(count: u64, u: f64) -> u64 {
    let cdf = &HALF_CDF[count as usize];
    for (k, &cum) in cdf.iter().enumerate() {
        if u <= cum {
            return k as u64;
        }
    }
    count
}

/// Inverse CDF by walking the pmf recurrence
/// `pmf(k+1) = pmf(k) · (n-k)/(k+1) · p/q`.
fn exact_inverse_cdf(n: u64, p: f64, u: f64) -> u64 {
    let q = 1.0 - p;
    let mut prob = q.powi(n as i32);
    let mut cum = prob;
    if u <= cum {
        return 0;
    }
    for k in 0..n {
        prob = prob * (n - k) as f64 / (k + 1) as f64 * (p / q);
        cum += prob;
        if u <= cum {
            return k + 1;
        }
    }
    n
}

/// `round(np + z·sqrt(npq))` with `z = sqrt(2)·erf⁻¹(2u − 1)`, clamped
/// into `[0, n]`.
fn normal_approx(n: u64, p: f64, u: f64) -> u64 {
    let u = u.clamp(1e-12, 1.0 - 1e-12);
    let z = std::f64::consts::SQRT_2 * puruspe::inverf(2.0 * u - 1.0);
    let mean = n as f64 * p;
    let stddev = (n as f64 * p * (1.0 - p)).sqrt();
    let sampled = (mean + z * stddev).round();
    if sampled <= 0.0 {
        0
    } else if sampled >= n as f64 {
        n
    } else {
        sampled as u64
    }
}
