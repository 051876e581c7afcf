//! Early-location ledger: per-raid claim table mapping a reaction key to the
//! ordered list of members who claimed it. The capacity invariant lives here
//! and nowhere else; every capacity-sensitive caller re-checks through
//! [`EarlyLocationLedger::claim`] at commit time.

use crate::catalog::ReactionDef;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Appended; `exhausted` is true when this claim filled the last slot.
    Claimed { exhausted: bool },
    /// Capacity already reached.
    SlotGone,
    /// Member already holds this key; no state change.
    Duplicate,
    /// Key is not part of the essential set.
    UnknownKey,
}

#[derive(Debug, Clone)]
pub struct EarlyLocationLedger {
    /// Essential reactions only (cap > 0), in resolver order.
    essential: Vec<ReactionDef>,
    claims: HashMap<String, Vec<u64>>,
}

impl EarlyLocationLedger {
    /// Builds the ledger from a resolved reaction set; cosmetic (cap 0)
    /// reactions never enter.
    pub fn new(resolved: &[ReactionDef]) -> Self {
        let essential: Vec<ReactionDef> =
            resolved.iter().filter(|r| r.is_essential()).cloned().collect();
        let claims = essential.iter().map(|r| (r.key.clone(), Vec::new())).collect();
        Self { essential, claims }
    }

    pub fn essential(&self) -> &[ReactionDef] {
        &self.essential
    }

    pub fn definition(&self, key: &str) -> Option<&ReactionDef> {
        self.essential.iter().find(|r| r.key == key)
    }

    /// True iff the key is essential and below capacity. Keys outside the
    /// essential set return false.
    pub fn still_needs(&self, key: &str) -> bool {
        match (self.definition(key), self.claims.get(key)) {
            (Some(def), Some(list)) => (list.len() as u32) < def.cap,
            _ => false,
        }
    }

    pub fn has_claimed(&self, member: u64, key: &str) -> bool {
        self.claims.get(key).map(|l| l.contains(&member)).unwrap_or(false)
    }

    /// Any essential claim at all, used for location reveal.
    pub fn has_any_claim(&self, member: u64) -> bool {
        self.claims.values().any(|l| l.contains(&member))
    }

    pub fn claimants(&self, key: &str) -> &[u64] {
        self.claims.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Single mutation point. Capacity is re-checked here so callers that
    /// suspended between their pre-check and this commit cannot overfill.
    pub fn claim(&mut self, member: u64, key: &str) -> ClaimOutcome {
        let Some(def) = self.definition(key).cloned() else {
            return ClaimOutcome::UnknownKey;
        };
        let list = self.claims.get_mut(key).expect("essential key has a claim list");
        if list.contains(&member) {
            return ClaimOutcome::Duplicate;
        }
        if (list.len() as u32) >= def.cap {
            return ClaimOutcome::SlotGone;
        }
        list.push(member);
        ClaimOutcome::Claimed { exhausted: (list.len() as u32) == def.cap }
    }

    /// Replays persisted claims during crash recovery. Duplicates and
    /// overflow are ignored; ordering of the persisted journal is advisory.
    pub fn restore(&mut self, persisted: &[(String, u64)]) {
        for (key, member) in persisted {
            let _ = self.claim(*member, key);
        }
    }

    /// (key, claimed, cap) triples for display, in resolver order.
    pub fn counts(&self) -> Vec<(String, u32, u32)> {
        self.essential
            .iter()
            .map(|r| (r.key.clone(), self.claimants(&r.key).len() as u32, r.cap))
            .collect()
    }

    /// Snapshot of all claims for persistence.
    pub fn dump(&self) -> Vec<(String, Vec<u64>)> {
        self.essential
            .iter()
            .map(|r| (r.key.clone(), self.claimants(&r.key).to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ReactionCategory, ReactionDef};

    fn def(key: &str, cap: u32) -> ReactionDef {
        ReactionDef {
            key: key.into(),
            name: key.into(),
            category: ReactionCategory::Key,
            emoji: Some("🗝️".into()),
            cap,
        }
    }

    fn ledger() -> EarlyLocationLedger {
        EarlyLocationLedger::new(&[def("KEY", 2), def("VIAL", 1), def("COSMETIC", 0)])
    }

    #[test]
    fn cosmetic_reactions_never_enter_the_ledger() {
        let l = ledger();
        assert_eq!(l.essential().len(), 2);
        assert!(!l.still_needs("COSMETIC"));
        assert_eq!(l.claimants("COSMETIC"), &[] as &[u64]);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut l = ledger();
        assert_eq!(l.claim(1, "KEY"), ClaimOutcome::Claimed { exhausted: false });
        assert_eq!(l.claim(2, "KEY"), ClaimOutcome::Claimed { exhausted: true });
        assert_eq!(l.claim(3, "KEY"), ClaimOutcome::SlotGone);
        assert_eq!(l.claimants("KEY"), &[1, 2]);
        assert!(!l.still_needs("KEY"));
    }

    #[test]
    fn double_claim_is_idempotent() {
        let mut l = ledger();
        assert_eq!(l.claim(1, "KEY"), ClaimOutcome::Claimed { exhausted: false });
        assert_eq!(l.claim(1, "KEY"), ClaimOutcome::Duplicate);
        assert_eq!(l.claimants("KEY"), &[1]);
        assert!(l.still_needs("KEY"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut l = ledger();
        assert_eq!(l.claim(1, "NOPE"), ClaimOutcome::UnknownKey);
        assert!(!l.still_needs("NOPE"));
    }

    #[test]
    fn restore_rebuilds_equivalent_state_regardless_of_order() {
        let mut a = ledger();
        a.claim(1, "KEY");
        a.claim(2, "KEY");
        a.claim(3, "VIAL");

        // Journal replayed in a different order, with a duplicate and an
        // overflow entry mixed in.
        let journal = vec![
            ("VIAL".to_string(), 3),
            ("KEY".to_string(), 2),
            ("KEY".to_string(), 2),
            ("KEY".to_string(), 1),
            ("KEY".to_string(), 9),
        ];
        let mut b = ledger();
        b.restore(&journal);

        for (key, _, cap) in a.counts() {
            let mut left: Vec<u64> = a.claimants(&key).to_vec();
            let mut right: Vec<u64> = b.claimants(&key).to_vec();
            left.sort_unstable();
            right.sort_unstable();
            assert_eq!(left, right, "claim sets differ for {key}");
            assert!(right.len() as u32 <= cap);
        }
    }
}
