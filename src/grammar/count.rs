//! Sums of fractional sample weights that do not depend on summation order.
//!
//! Weights split across semantic alternatives are rarely dyadic, so plain
//! `f64` accumulation rounds differently depending on how the samples were
//! partitioned. A [`Count`] keeps its sum exactly as a list of non-overlapping
//! partials (Shewchuk, 1997) and only rounds when the value is read, giving the
//! correctly rounded total of every weight ever added.

use std::iter::Sum;

/// An exact running sum of `f64` weights
///
/// ```rust
/// use semantic_guesser_rs::grammar::Count;
///
/// let mut count = Count::default();
/// for _ in 0..10 {
///     count.add(0.1);
/// }
/// assert!(count == 1.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Count {
    /// Non-overlapping, increasing in magnitude
    partials: Vec<f64>,
    /// Infinite and NaN weights, which cannot be kept exactly
    non_finite: f64,
}

impl Count {
    pub fn new(weight: f64) -> Self {
        let mut count = Self::default();
        count.add(weight);
        count
    }

    pub fn add(&mut self, weight: f64) {
        if !weight.is_finite() {
            self.non_finite += weight;
            return;
        }
        let mut x = weight;
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
    }

    /// Adds everything `other` holds
    pub fn merge(&mut self, other: &Count) {
        self.non_finite += other.non_finite;
        for &partial in &other.partials {
            self.add(partial);
        }
    }

    /// The correctly rounded sum
    pub fn value(&self) -> f64 {
        if self.non_finite != 0.0 || self.non_finite.is_nan() {
            return self.non_finite;
        }
        let Some(mut n) = self.partials.len().checked_sub(1) else {
            return 0.0;
        };
        let mut hi = self.partials[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = self.partials[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // half way cases round to even only if the remaining partials agree
        if n > 0 {
            let below = self.partials[n - 1];
            if (lo < 0.0 && below < 0.0) || (lo > 0.0 && below > 0.0) {
                let y = lo * 2.0;
                let x = hi + y;
                if y == x - hi {
                    hi = x;
                }
            }
        }
        hi
    }
}

impl From<f64> for Count {
    fn from(weight: f64) -> Self {
        Self::new(weight)
    }
}

impl PartialEq for Count {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl PartialEq<f64> for Count {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl<'a> Sum<&'a Count> for Count {
    fn sum<I: Iterator<Item = &'a Count>>(iter: I) -> Self {
        iter.fold(Count::default(), |mut total, count| {
            total.merge(count);
            total
        })
    }
}
