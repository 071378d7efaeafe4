//! Distance kernels
//!
//! Explicit SIMD paths for aarch64 (NEON) and x86_64 (AVX2+FMA, detected at
//! runtime), with a scalar fallback that LLVM auto-vectorizes.
//!
//! | Platform     | ISA      | Width            |
//! |--------------|----------|------------------|
//! | Apple M1+    | NEON     | 128-bit (4×f32)  |
//! | x86_64+AVX2  | AVX2+FMA | 256-bit (8×f32)  |
//! | other        | scalar   | 1×f32            |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// aarch64 NEON intrinsics
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let chunks = a.len() / 4;
    let mut acc = vdupq_n_f32(0.0);
    let (a_ptr, b_ptr) = (a.as_ptr(), b.as_ptr());

    for i in 0..chunks {
        let va = vld1q_f32(a_ptr.add(i * 4));
        let vb = vld1q_f32(b_ptr.add(i * 4));
        acc = vfmaq_f32(acc, va, vb);
    }

    let mut sum = vaddvq_f32(acc);
    for i in chunks * 4..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn l2_distance_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let chunks = a.len() / 4;
    let mut acc = vdupq_n_f32(0.0);
    let (a_ptr, b_ptr) = (a.as_ptr(), b.as_ptr());

    for i in 0..chunks {
        let diff = vsubq_f32(vld1q_f32(a_ptr.add(i * 4)), vld1q_f32(b_ptr.add(i * 4)));
        acc = vfmaq_f32(acc, diff, diff);
    }

    let mut sum = vaddvq_f32(acc);
    for i in chunks * 4..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

// ============================================================================
// x86_64 AVX2 intrinsics
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn horizontal_sum_avx(acc: std::arch::x86_64::__m256) -> f32 {
    use std::arch::x86_64::*;

    let hi = _mm256_extractf128_ps(acc, 1);
    let lo = _mm256_castps256_ps128(acc);
    let sum128 = _mm_add_ps(lo, hi);
    let sums = _mm_add_ps(sum128, _mm_movehdup_ps(sum128));
    _mm_cvtss_f32(_mm_add_ss(sums, _mm_movehl_ps(sums, sums)))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let chunks = a.len() / 8;
    let mut acc = _mm256_setzero_ps();
    let (a_ptr, b_ptr) = (a.as_ptr(), b.as_ptr());

    for i in 0..chunks {
        let va = _mm256_loadu_ps(a_ptr.add(i * 8));
        let vb = _mm256_loadu_ps(b_ptr.add(i * 8));
        acc = _mm256_fmadd_ps(va, vb, acc);
    }

    let mut sum = horizontal_sum_avx(acc);
    for i in chunks * 8..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn l2_distance_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let chunks = a.len() / 8;
    let mut acc = _mm256_setzero_ps();
    let (a_ptr, b_ptr) = (a.as_ptr(), b.as_ptr());

    for i in 0..chunks {
        let diff = _mm256_sub_ps(
            _mm256_loadu_ps(a_ptr.add(i * 8)),
            _mm256_loadu_ps(b_ptr.add(i * 8)),
        );
        acc = _mm256_fmadd_ps(diff, diff, acc);
    }

    let mut sum = horizontal_sum_avx(acc);
    for i in chunks * 8..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

// ============================================================================
// Scalar fallback
// ============================================================================

#[inline(always)]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline(always)]
fn l2_distance_squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ============================================================================
// Public dispatch functions
// ============================================================================

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { dot_product_neon(a, b) };
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    dot_product_scalar(a, b)
}

/// Squared Euclidean distance. This is the value reported for the L2 metric;
/// no square root is taken.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { l2_distance_squared_neon(a, b) };
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { l2_distance_squared_avx2(a, b) };
        }
    }

    l2_distance_squared_scalar(a, b)
}

/// Distance metric stored in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    /// Squared L2 distance, nearest first (ascending).
    #[default]
    L2,
    /// Inner product similarity, most similar first (descending).
    InnerProduct,
}

impl Metric {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Metric::L2),
            1 => Some(Metric::InnerProduct),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Metric::L2 => 0,
            Metric::InnerProduct => 1,
        }
    }

    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => l2_distance_squared(a, b),
            Metric::InnerProduct => dot_product(a, b),
        }
    }

    /// Ranking order of two scores under this metric. `Less` means `a` ranks
    /// ahead of `b`. NaN ranks last.
    #[inline]
    pub fn compare(self, a: f32, b: f32) -> Ordering {
        let ord = match (a.is_nan(), b.is_nan()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        };
        match self {
            Metric::L2 => ord,
            Metric::InnerProduct => ord.reverse(),
        }
    }

    /// Score used for padding slots that hold no result.
    pub fn worst_score(self) -> f32 {
        match self {
            Metric::L2 => f32::INFINITY,
            Metric::InnerProduct => f32::NEG_INFINITY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" => Ok(Metric::L2),
            "ip" | "inner_product" => Ok(Metric::InnerProduct),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}
