//! Views and view changes.
//!
//! A view fixes the tree every round runs over. A node that stops hearing from its parent
//! proposes the next view; the root of that view switches everybody over once enough of the
//! roster has asked for it.
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::tree::{NodeId, Roster, Tree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Root,
    Regular,
}

/// Decides when a proposed view has enough votes.
pub trait QuorumRule: Send + Sync {
    fn reached(&self, votes: usize, roster_size: usize) -> bool;
}

/// Strictly more than half of the roster.
#[derive(Clone, Copy, Debug, Default)]
pub struct Majority;

impl QuorumRule for Majority {
    fn reached(&self, votes: usize, roster_size: usize) -> bool {
        votes * 2 > roster_size
    }
}

#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    votes: BTreeMap<u64, BTreeSet<NodeId>>,
}

impl VoteTally {
    /// Count `voter` for `view` and return how many distinct voters the view has.
    pub fn record(&mut self, view: u64, voter: NodeId) -> usize {
        let voters = self.votes.entry(view).or_default();
        voters.insert(voter);
        voters.len()
    }

    pub fn has_voted(&self, view: u64, voter: NodeId) -> bool {
        self.votes.get(&view).map_or(false, |voters| voters.contains(&voter))
    }

    pub fn count(&self, view: u64) -> usize {
        self.votes.get(&view).map(BTreeSet::len).unwrap_or(0)
    }

    /// Forget every view up to and including `view`.
    pub fn settle(&mut self, view: u64) {
        self.votes.retain(|proposed, _| *proposed > view);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub proposed: u64,
    pub attempts: u32,
    pub deadline: Instant,
}

pub struct ViewState {
    view: u64,
    tree: Tree,
    pending: Option<PendingChange>,
    heartbeat_deadline: Instant,
    last_seen_vote: u64,
}

impl ViewState {
    pub fn new(tree: Tree, heartbeat_deadline: Instant) -> Self {
        ViewState {
            view: tree.view(),
            tree,
            pending: None,
            heartbeat_deadline,
            last_seen_vote: 0,
        }
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn role_of(&self, id: NodeId) -> Role {
        if self.tree.root() == id {
            Role::Root
        } else {
            Role::Regular
        }
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent_of(id)
    }

    pub fn reset_heartbeat(&mut self, deadline: Instant) {
        self.heartbeat_deadline = deadline;
    }

    pub fn heartbeat_deadline(&self) -> Instant {
        self.heartbeat_deadline
    }

    pub fn pending(&self) -> Option<PendingChange> {
        self.pending
    }

    /// Start proposing `proposed`, or propose again after a failed attempt.
    pub fn propose(&mut self, proposed: u64, now: Instant, timeout: Duration) -> PendingChange {
        let attempts = self.pending.map(|pending| pending.attempts + 1).unwrap_or(1);
        let pending = PendingChange {
            proposed,
            attempts,
            deadline: now + timeout,
        };
        self.pending = Some(pending);
        self.note_vote(proposed);
        pending
    }

    /// Drop the pending change without switching views, e.g. because the parent came back.
    pub fn cancel_pending(&mut self) -> Option<PendingChange> {
        self.pending.take()
    }

    pub fn note_vote(&mut self, view: u64) {
        self.last_seen_vote = self.last_seen_vote.max(view);
    }

    pub fn last_seen_vote(&self) -> u64 {
        self.last_seen_vote
    }

    /// Switch to the tree of `view`, ending any pending change.
    pub fn apply(&mut self, roster: &Roster, view: u64, branching: usize, heartbeat_deadline: Instant) -> bool {
        match Tree::for_view(roster, view, branching) {
            Some(tree) => {
                self.view = view;
                self.tree = tree;
                self.pending = None;
                self.heartbeat_deadline = heartbeat_deadline;
                self.note_vote(view);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::group::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn majority_is_strict() {
        assert!(!Majority.reached(1, 3));
        assert!(Majority.reached(2, 3));
        assert!(!Majority.reached(2, 4));
        assert!(Majority.reached(3, 4));
        assert!(Majority.reached(1, 1));
    }

    #[test]
    fn votes_count_each_voter_once() {
        let mut tally = VoteTally::default();
        assert_eq!(tally.record(1, NodeId(2)), 1);
        assert_eq!(tally.record(1, NodeId(2)), 1);
        assert_eq!(tally.record(1, NodeId(3)), 2);
        tally.record(2, NodeId(3));
        assert!(tally.has_voted(2, NodeId(3)));
        assert!(!tally.has_voted(2, NodeId(2)));
        tally.settle(1);
        assert_eq!(tally.count(1), 0);
        assert_eq!(tally.count(2), 1);
    }

    #[test]
    fn proposals_count_attempts_until_applied() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let roster = Roster::from_keys((0..3).map(|_| KeyPair::generate(&mut rng).public()));
        let now = Instant::now();
        let mut state = ViewState::new(Tree::for_view(&roster, 0, 2).unwrap(), now);
        assert_eq!(state.role_of(NodeId(0)), Role::Root);

        assert_eq!(state.propose(1, now, Duration::from_secs(1)).attempts, 1);
        assert_eq!(state.propose(2, now, Duration::from_secs(1)).attempts, 2);
        assert_eq!(state.last_seen_vote(), 2);

        assert!(state.apply(&roster, 2, 2, now));
        assert_eq!(state.view(), 2);
        assert_eq!(state.pending(), None);
        assert_eq!(state.role_of(NodeId(2)), Role::Root);
        assert_eq!(state.parent_of(NodeId(0)), Some(NodeId(2)));
    }

    #[test]
    fn cancelled_proposals_start_counting_again() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let roster = Roster::from_keys((0..3).map(|_| KeyPair::generate(&mut rng).public()));
        let now = Instant::now();
        let mut state = ViewState::new(Tree::for_view(&roster, 0, 2).unwrap(), now);

        state.propose(1, now, Duration::from_secs(1));
        state.propose(2, now, Duration::from_secs(1));
        let cancelled = state.cancel_pending().unwrap();
        assert_eq!((cancelled.proposed, cancelled.attempts), (2, 2));
        assert_eq!(state.pending(), None);
        assert_eq!(state.cancel_pending(), None);
        // still in the old view, but the highest vote seen is kept
        assert_eq!(state.view(), 0);
        assert_eq!(state.last_seen_vote(), 2);

        assert_eq!(state.propose(3, now, Duration::from_secs(1)).attempts, 1);
    }
}
