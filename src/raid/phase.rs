//! Raid lifecycle phases. Transitions only move forward; the abort path is
//! the one shortcut, reaching `Ended` straight from `PreOpen` or `Open`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Wizard running; no resources created yet.
    Pending,
    /// Voice channel exists, only priority claimants may connect.
    PreOpen,
    /// Everyone may connect; claim buttons live; countdown running.
    Open,
    /// Channel locked to new entrants; operational controls available.
    Active,
    /// Resources released, instance deregistered.
    Ended,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, PreOpen)
                | (PreOpen, Open)
                | (Open, Active)
                | (Active, Ended)
                | (PreOpen, Ended)
                | (Open, Ended)
        )
    }

    /// Claim interactions are only honored while collecting.
    pub fn is_collecting(self) -> bool {
        matches!(self, Phase::PreOpen | Phase::Open)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Ended
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::PreOpen => "pre-open",
            Phase::Open => "open",
            Phase::Active => "active",
            Phase::Ended => "ended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Phase::*;

    #[test]
    fn transitions_only_move_forward() {
        assert!(Pending.can_advance_to(PreOpen));
        assert!(PreOpen.can_advance_to(Open));
        assert!(Open.can_advance_to(Active));
        assert!(Active.can_advance_to(Ended));

        assert!(!Open.can_advance_to(PreOpen));
        assert!(!Active.can_advance_to(Open));
        assert!(!Ended.can_advance_to(Active));
        assert!(!Pending.can_advance_to(Open));
        assert!(!PreOpen.can_advance_to(Active));
    }

    #[test]
    fn abort_shortcut_from_collecting_phases_only() {
        assert!(PreOpen.can_advance_to(Ended));
        assert!(Open.can_advance_to(Ended));
        assert!(!Pending.can_advance_to(Ended));
    }

    #[test]
    fn collecting_phases() {
        assert!(PreOpen.is_collecting());
        assert!(Open.is_collecting());
        assert!(!Active.is_collecting());
        assert!(!Ended.is_collecting());
    }
}
