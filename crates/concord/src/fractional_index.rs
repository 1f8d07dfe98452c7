//! Dense byte-string keys for sibling ordering.
//!
//! Keys compare lexicographically. [`FractionalIndex::between`] always finds
//! a key strictly between two distinct keys because generated keys never end
//! with a zero byte.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FractionalIndex(Vec<u8>);

const MID: u16 = 128;

impl Default for FractionalIndex {
    fn default() -> Self {
        FractionalIndex(vec![MID as u8])
    }
}

impl FractionalIndex {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        FractionalIndex(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Keys this module generates: non-empty and not ending with a zero
    /// byte, so another key always fits below them.
    pub fn is_valid(&self) -> bool {
        self.0.last().is_some_and(|b| *b != 0)
    }

    /// A key strictly between `lo` and `hi` (`None` meaning unbounded).
    ///
    /// When no key fits (`lo >= hi`, or `hi` ends with zero bytes) the key
    /// is placed right after `lo` instead.
    pub fn between(lo: Option<&FractionalIndex>, hi: Option<&FractionalIndex>) -> FractionalIndex {
        let hi = match (lo, hi) {
            (Some(l), Some(h)) if l >= h => None,
            _ => hi,
        };
        let lo = lo.map(|k| k.0.as_slice()).unwrap_or(&[]);
        let mut out = Vec::with_capacity(lo.len() + 1);
        let mut hi_active = hi.is_some();
        let mut i = 0;
        loop {
            if hi.is_some_and(|h| hi_active && i >= h.0.len()) {
                hi_active = false;
            }
            let l = lo.get(i).copied().map_or(0, u16::from);
            let h = match hi {
                Some(h) if hi_active => h.0.get(i).copied().map_or(0, u16::from),
                _ => 256,
            };
            if h > l + 1 {
                out.push(((l + h) / 2) as u8);
                return FractionalIndex(out);
            }
            out.push(l as u8);
            if l < h {
                hi_active = false;
            }
            i += 1;
        }
    }

    /// `n` increasing keys between `lo` and `hi`.
    pub fn generate_n(
        lo: Option<&FractionalIndex>,
        hi: Option<&FractionalIndex>,
        n: usize,
    ) -> Vec<FractionalIndex> {
        let mut out = Vec::with_capacity(n);
        let mut prev = lo.cloned();
        for _ in 0..n {
            let next = FractionalIndex::between(prev.as_ref(), hi);
            out.push(next.clone());
            prev = Some(next);
        }
        out
    }
}

impl fmt::Display for FractionalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unbounded_is_midpoint() {
        assert_eq!(FractionalIndex::between(None, None).as_bytes(), &[128]);
    }

    #[test]
    fn append_and_prepend() {
        let a = FractionalIndex::default();
        let after = FractionalIndex::between(Some(&a), None);
        let before = FractionalIndex::between(None, Some(&a));
        assert!(before < a && a < after);
    }

    #[test]
    fn adjacent_bytes_descend() {
        let lo = FractionalIndex::from_bytes(vec![5]);
        let hi = FractionalIndex::from_bytes(vec![6]);
        let mid = FractionalIndex::between(Some(&lo), Some(&hi));
        assert!(lo < mid && mid < hi);
        assert_eq!(mid.as_bytes(), &[5, 128]);
    }

    #[test]
    fn unordered_bounds_fall_back_to_after_lo() {
        let k = FractionalIndex::default();
        let next = FractionalIndex::between(Some(&k), Some(&k));
        assert!(next > k);
    }

    #[test]
    fn zero_terminated_upper_bound_still_returns() {
        let hi = FractionalIndex::from_bytes(vec![0]);
        let key = FractionalIndex::between(None, Some(&hi));
        assert!(key.is_valid());
        let hi = FractionalIndex::from_bytes(vec![3, 0, 0]);
        let lo = FractionalIndex::from_bytes(vec![3]);
        assert!(FractionalIndex::between(Some(&lo), Some(&hi)) > lo);
    }

    #[test]
    fn generate_n_is_increasing() {
        let keys = FractionalIndex::generate_n(None, None, 5);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn repeated_bisection_stays_ordered(steps in proptest::collection::vec(any::<bool>(), 1..40)) {
            let mut lo = FractionalIndex::default();
            let mut hi = FractionalIndex::between(Some(&lo), None);
            for go_left in steps {
                let mid = FractionalIndex::between(Some(&lo), Some(&hi));
                prop_assert!(lo < mid && mid < hi);
                prop_assert_ne!(mid.as_bytes().last(), Some(&0));
                if go_left { hi = mid } else { lo = mid }
            }
        }
    }
}
