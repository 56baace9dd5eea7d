//! Optimistic upvote toggling.
//!
//! A click flips the current user's membership locally before the store has
//! answered. The answer either commits (the store's state replaces ours) or
//! rolls the issue back to the snapshot taken at click time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Issue, UserId};

/// Upvote count and the users behind it. No user appears twice. States built
/// with [`UpvoteState::new`] keep `upvotes == upvoted_by.len()`, and toggling
/// moves the count by exactly one, so that equality is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpvoteState {
    pub upvotes: u32,
    pub upvoted_by: Vec<UserId>,
}

impl UpvoteState {
    pub fn new(mut upvoted_by: Vec<UserId>) -> Self {
        let mut seen = std::collections::HashSet::new();
        upvoted_by.retain(|id| seen.insert(*id));
        UpvoteState {
            upvotes: upvoted_by.len() as u32,
            upvoted_by,
        }
    }

    pub fn from_issue(issue: &Issue) -> Self {
        Self::new(issue.upvoted_by.clone())
    }

    pub fn has_upvoted(&self, user: UserId) -> bool {
        self.upvoted_by.contains(&user)
    }

    /// Flips `user`'s membership. Returns whether the user now upvotes.
    pub fn toggle(&mut self, user: UserId) -> bool {
        if let Some(pos) = self.upvoted_by.iter().position(|id| *id == user) {
            self.upvoted_by.remove(pos);
            self.upvotes = self.upvotes.saturating_sub(1);
            false
        } else {
            self.upvoted_by.push(user);
            self.upvotes += 1;
            true
        }
    }

    pub fn apply_to(&self, issue: &mut Issue) {
        issue.upvotes = self.upvotes;
        issue.upvoted_by = self.upvoted_by.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvotePhase {
    /// Local state flipped, request not answered yet.
    Pending,
    /// The store accepted the toggle.
    Committed,
    /// The request failed and the snapshot was restored.
    RolledBack,
}

/// Upvote button state for one issue card.
#[derive(Debug, Clone)]
pub struct UpvoteToggle {
    state: UpvoteState,
    snapshot: Option<UpvoteState>,
    phase: Option<UpvotePhase>,
}

impl UpvoteToggle {
    pub fn new(state: UpvoteState) -> Self {
        UpvoteToggle {
            state,
            snapshot: None,
            phase: None,
        }
    }

    pub fn state(&self) -> &UpvoteState {
        &self.state
    }

    pub fn phase(&self) -> Option<UpvotePhase> {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.phase == Some(UpvotePhase::Pending)
    }

    /// Applies the optimistic flip. A click while a request is in flight is
    /// ignored and returns false.
    pub fn click(&mut self, user: UserId) -> bool {
        if self.is_pending() {
            debug!(user, "upvote click ignored while a request is in flight");
            return false;
        }
        self.snapshot = Some(self.state.clone());
        self.state.toggle(user);
        self.phase = Some(UpvotePhase::Pending);
        true
    }

    /// Settles the in-flight request. On success the store's state wins;
    /// on failure the snapshot is restored.
    pub fn settle<E: std::fmt::Display>(
        &mut self,
        outcome: Result<UpvoteState, E>,
    ) -> UpvotePhase {
        if !self.is_pending() {
            return self.phase.unwrap_or(UpvotePhase::Committed);
        }
        let phase = match outcome {
            Ok(confirmed) => {
                self.state = confirmed;
                UpvotePhase::Committed
            }
            Err(e) => {
                debug!(error = %e, "upvote request failed, reverting");
                if let Some(snapshot) = self.snapshot.take() {
                    self.state = snapshot;
                }
                UpvotePhase::RolledBack
            }
        };
        self.snapshot = None;
        self.phase = Some(phase);
        phase
    }

    /// Click, send, settle in one step.
    pub fn toggle_with<F, E>(&mut self, user: UserId, send: F) -> Option<UpvotePhase>
    where
        F: FnOnce() -> Result<UpvoteState, E>,
        E: std::fmt::Display,
    {
        if !self.click(user) {
            return None;
        }
        Some(self.settle(send()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const U1: UserId = 1;

    fn five_anonymous_votes() -> UpvoteState {
        // Count carried over from a source that did not report voter ids.
        UpvoteState {
            upvotes: 5,
            upvoted_by: Vec::new(),
        }
    }

    #[test]
    fn test_new_dedups_voters() {
        let state = UpvoteState::new(vec![1, 2, 1, 3, 2]);
        assert_eq!(state.upvoted_by, vec![1, 2, 3]);
        assert_eq!(state.upvotes, 3);
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut state = UpvoteState::default();
        assert!(state.toggle(U1));
        assert_eq!(state.upvoted_by, vec![U1]);
        assert!(!state.toggle(U1));
        assert!(state.upvoted_by.is_empty());
        assert_eq!(state.upvotes, 0);
    }

    #[test]
    fn test_click_then_commit() {
        let mut toggle = UpvoteToggle::new(UpvoteState::default());
        assert!(toggle.click(U1));
        assert_eq!(toggle.phase(), Some(UpvotePhase::Pending));
        assert_eq!(toggle.state().upvoted_by, vec![U1]);

        let phase = toggle.settle::<String>(Ok(UpvoteState::new(vec![7, U1])));
        assert_eq!(phase, UpvotePhase::Committed);
        assert_eq!(toggle.state().upvoted_by, vec![7, U1]);
        assert_eq!(toggle.state().upvotes, 2);
    }

    #[test]
    fn test_failed_request_rolls_back() {
        let mut toggle = UpvoteToggle::new(UpvoteState::new(vec![3]));
        let phase = toggle.toggle_with(U1, || Err("network down"));
        assert_eq!(phase, Some(UpvotePhase::RolledBack));
        assert_eq!(toggle.state(), &UpvoteState::new(vec![3]));
    }

    #[test]
    fn test_double_click_ignored_while_pending() {
        let mut toggle = UpvoteToggle::new(UpvoteState::default());
        assert!(toggle.click(U1));
        assert!(!toggle.click(U1));
        assert_eq!(toggle.state().upvoted_by, vec![U1]);
    }

    #[test]
    fn test_settle_without_click_is_noop() {
        let mut toggle = UpvoteToggle::new(UpvoteState::new(vec![2]));
        let phase = toggle.settle::<String>(Err("late".into()));
        assert_eq!(phase, UpvotePhase::Committed);
        assert_eq!(toggle.state().upvoted_by, vec![2]);
    }

    #[test]
    fn test_upvote_scenario_from_five() {
        let mut state = five_anonymous_votes();
        assert!(state.toggle(U1));
        assert_eq!(state.upvotes, 6);
        assert_eq!(state.upvoted_by, vec![U1]);

        assert!(!state.toggle(U1));
        assert_eq!(state, five_anonymous_votes());
    }

    #[test]
    fn test_optimistic_count_before_commit() {
        let mut toggle = UpvoteToggle::new(five_anonymous_votes());
        toggle.click(U1);
        assert_eq!(toggle.state().upvotes, 6);
        toggle.settle::<String>(Err("timeout".into()));
        assert_eq!(toggle.state(), &five_anonymous_votes());
        assert_eq!(toggle.phase(), Some(UpvotePhase::RolledBack));
    }

    proptest! {
        #[test]
        fn prop_toggle_keeps_invariants(clicks in proptest::collection::vec(0i64..4, 0..40)) {
            let mut state = UpvoteState::default();
            for user in clicks {
                state.toggle(user);
                let mut ids = state.upvoted_by.clone();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), state.upvoted_by.len());
                prop_assert_eq!(state.upvotes as usize, state.upvoted_by.len());
            }
        }

        #[test]
        fn prop_even_toggles_restore_membership(user in 0i64..100, n in 0usize..10) {
            let mut state = UpvoteState::new(vec![1000]);
            let before = state.has_upvoted(user);
            for _ in 0..(n * 2) {
                state.toggle(user);
            }
            prop_assert_eq!(state.has_upvoted(user), before);
        }
    }
}
