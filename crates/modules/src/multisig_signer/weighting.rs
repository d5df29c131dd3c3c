use std::{collections::HashMap, fmt::Debug};

use alloy_primitives::B256;

/// How much each member of a [`ThresholdSignerSet`](super::ThresholdSignerSet)
/// counts toward its threshold.
///
/// Implementations only track weights of current members. The set notifies
/// them of every membership change.
pub trait Weighting: Debug + Clone + Default {
    /// Weight of member `id`.
    fn weight_of(&self, id: &B256) -> u64;

    /// Sum of all member weights, given the member count.
    fn total_weight(&self, members: usize) -> u128;

    fn on_added(&mut self, id: B256);

    fn on_removed(&mut self, id: &B256);
}

/// Every signer counts once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unweighted;

impl Weighting for Unweighted {
    fn weight_of(&self, _id: &B256) -> u64 {
        1
    }

    fn total_weight(&self, members: usize) -> u128 {
        members as u128
    }

    fn on_added(&mut self, _id: B256) {}

    fn on_removed(&mut self, _id: &B256) {}
}

/// Per-signer weights, defaulting to 1, with an incrementally maintained total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Weighted {
    weights: HashMap<B256, u64>,
    total: u128,
}

impl Weighted {
    /// Sets the weight of an existing member. Zero weights are rejected by the
    /// caller.
    pub(crate) fn set_weight(&mut self, id: B256, weight: u64) {
        let previous = self.weights.insert(id, weight).unwrap_or(1);
        self.total = self.total - u128::from(previous) + u128::from(weight);
    }
}

impl Weighting for Weighted {
    fn weight_of(&self, id: &B256) -> u64 {
        self.weights.get(id).copied().unwrap_or(1)
    }

    fn total_weight(&self, _members: usize) -> u128 {
        self.total
    }

    fn on_added(&mut self, id: B256) {
        self.weights.insert(id, 1);
        self.total += 1;
    }

    fn on_removed(&mut self, id: &B256) {
        if let Some(weight) = self.weights.remove(id) {
            self.total -= u128::from(weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_total_tracks_membership() {
        let (a, b) = (B256::repeat_byte(0xa), B256::repeat_byte(0xb));
        let mut weighting = Weighted::default();

        weighting.on_added(a);
        weighting.on_added(b);
        assert_eq!(weighting.total_weight(2), 2);

        weighting.set_weight(a, u64::MAX);
        assert_eq!(weighting.total_weight(2), u128::from(u64::MAX) + 1);

        weighting.on_removed(&a);
        assert_eq!(weighting.total_weight(1), 1);
        assert_eq!(weighting.weight_of(&b), 1);
    }
}
