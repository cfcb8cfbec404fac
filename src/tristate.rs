//! Three-valued (Kleene) logic over `Option<bool>`.
//!
//! `None` stands for "unknown": a value that could not be determined because
//! something it depends on is absent. Every operator propagates unknown
//! instead of failing, and comparisons involving NaN are unknown as well.

use std::cmp::Ordering;

/// Kleene conjunction. `false` dominates unknown.
pub fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Kleene disjunction. `true` dominates unknown.
pub fn or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn not(a: Option<bool>) -> Option<bool> {
    a.map(|v| !v)
}

fn compare<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<Ordering> {
    a?.partial_cmp(&b?)
}

pub fn lt<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<bool> {
    compare(a, b).map(Ordering::is_lt)
}

pub fn le<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<bool> {
    compare(a, b).map(Ordering::is_le)
}

pub fn gt<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<bool> {
    compare(a, b).map(Ordering::is_gt)
}

pub fn ge<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<bool> {
    compare(a, b).map(Ordering::is_ge)
}

pub fn eq<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<bool> {
    compare(a, b).map(Ordering::is_eq)
}

/// Collapse a condition for a loop guard: only a known `true` holds.
#[inline]
pub fn holds(a: Option<bool>) -> bool {
    a == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [Option<bool>; 3] = [Some(true), Some(false), None];

    #[test]
    fn test_and_truth_table() {
        assert_eq!(and(Some(true), Some(true)), Some(true));
        assert_eq!(and(Some(true), None), None);
        assert_eq!(and(None, Some(false)), Some(false));
        assert_eq!(and(None, None), None);
    }

    #[test]
    fn test_or_truth_table() {
        assert_eq!(or(Some(false), Some(false)), Some(false));
        assert_eq!(or(Some(false), None), None);
        assert_eq!(or(None, Some(true)), Some(true));
    }

    #[test]
    fn test_de_morgan() {
        for a in VALUES {
            for b in VALUES {
                assert_eq!(not(and(a, b)), or(not(a), not(b)));
            }
        }
    }

    #[test]
    fn test_comparisons_propagate_unknown() {
        assert_eq!(lt(Some(1), Some(2)), Some(true));
        assert_eq!(ge(Some(1), Some(2)), Some(false));
        assert_eq!(lt(None, Some(2)), None);
        assert_eq!(eq::<f64>(Some(1.0), None), None);
        assert_eq!(gt(Some(f64::NAN), Some(0.0)), None);
        assert_eq!(le(Some(f64::INFINITY), Some(f64::INFINITY)), Some(true));
    }

    #[test]
    fn test_holds() {
        assert!(holds(Some(true)));
        assert!(!holds(Some(false)));
        assert!(!holds(None));
    }
}
