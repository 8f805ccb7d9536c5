//! Availability check for requested ticket numbers against a sold-ticket snapshot.

use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub accepted: Vec<u32>,
    pub rejected: Vec<u32>,
}

impl Availability {
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty() && !self.accepted.is_empty()
    }
}

/// Split `requested` into numbers that could still be sold and those that cannot.
///
/// A number is rejected when it is outside `[1, total_tickets]`, already sold,
/// or repeats an earlier entry of the same request. Request order is preserved.
pub fn partition_requested(
    total_tickets: u32,
    sold: &HashSet<u32>,
    requested: &[u32],
) -> Availability {
    let mut seen = HashSet::with_capacity(requested.len());
    let mut out = Availability::default();

    for &n in requested {
        let in_range = (1..=total_tickets).contains(&n);
        if in_range && !sold.contains(&n) && seen.insert(n) {
            out.accepted.push(n);
        } else {
            out.rejected.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sold(nums: &[u32]) -> HashSet<u32> {
        nums.iter().copied().collect()
    }

    #[test]
    fn test_all_available() {
        let a = partition_requested(10, &sold(&[]), &[3, 4]);
        assert_eq!(a.accepted, vec![3, 4]);
        assert!(a.rejected.is_empty());
        assert!(a.all_accepted());
    }

    #[test]
    fn test_sold_number_rejected() {
        let a = partition_requested(10, &sold(&[3, 4]), &[4, 5]);
        assert_eq!(a.accepted, vec![5]);
        assert_eq!(a.rejected, vec![4]);
        assert!(!a.all_accepted());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let a = partition_requested(10, &sold(&[]), &[0, 10, 11]);
        assert_eq!(a.accepted, vec![10]);
        assert_eq!(a.rejected, vec![0, 11]);
    }

    #[test]
    fn test_repeat_in_request_rejected() {
        let a = partition_requested(10, &sold(&[]), &[7, 7]);
        assert_eq!(a.accepted, vec![7]);
        assert_eq!(a.rejected, vec![7]);
    }

    #[test]
    fn test_empty_request_is_not_all_accepted() {
        assert!(!partition_requested(10, &sold(&[]), &[]).all_accepted());
    }
}
