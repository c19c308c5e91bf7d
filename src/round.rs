//! Round orchestrator
//!
//! A [`Round`] binds one [`Cosi`] engine to the tree snapshot of its view and to the payload
//! of the node's local source. It folds the children's Merkle roots into the node's combined
//! tree, hands every child the proof of its subtree, and turns children that stay silent or
//! answer with something that does not add up into rejections and exceptions instead of
//! failing the round.
use std::collections::{BTreeMap, BTreeSet};

use secp256kfun::{g, G};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cosi::{verify_signature_with_exceptions, Announcement, Cosi, Exception};
use crate::error::RoundError;
use crate::group::{add_points, sub_points, sum_points, GroupPoint, KeyPair};
use crate::merkle::{CombinedTree, Hash, LeafOwner, Proof};
use crate::messages::{
    AnnouncementMessage, ChallengeMessage, CommitmentMessage, ResponseMessage,
    SignatureBroadcastMessage, StatusReturnMessage,
};
use crate::payload::Payload;
use crate::tree::{NodeId, Tree};

/// The closed set of round behaviours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    /// Signs only the tree structure; payload sources are not consulted.
    Cosi,
    /// Signs a batch from each node's payload source and hands back inclusion proofs.
    Stamp,
    /// As `Stamp`, and the root reports per-round statistics.
    Stats,
}

const ROUND_KINDS: [(&str, RoundKind); 3] = [
    ("cosi", RoundKind::Cosi),
    ("stamp", RoundKind::Stamp),
    ("stats", RoundKind::Stats),
];

impl RoundKind {
    pub fn from_tag(tag: &str) -> Option<RoundKind> {
        ROUND_KINDS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
    }

    pub fn tag(self) -> &'static str {
        ROUND_KINDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("cosi")
    }

    pub fn tags() -> impl Iterator<Item = &'static str> {
        ROUND_KINDS.iter().map(|(name, _)| *name)
    }

    pub fn uses_payload(self) -> bool {
        !matches!(self, RoundKind::Cosi)
    }

    pub fn reports_stats(self) -> bool {
        matches!(self, RoundKind::Stats)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundPhase {
    /// Waiting for the children's commitments.
    Announced,
    Committed,
    /// Waiting for the children's responses.
    Challenged,
    Responded,
    Finalized,
}

pub struct Round {
    node: NodeId,
    view: u64,
    number: u64,
    kind: RoundKind,
    phase: RoundPhase,
    cosi: Cosi,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    subtree_public: GroupPoint,
    child_keys: BTreeMap<NodeId, GroupPoint>,
    child_sizes: BTreeMap<NodeId, u64>,
    payload: Payload,
    commitments: BTreeMap<NodeId, CommitmentMessage>,
    rejected: Vec<GroupPoint>,
    messages: u64,
    merkle: Option<CombinedTree>,
    combined_root: Option<Hash>,
    message: Option<Vec<u8>>,
    local_proof: Option<Proof>,
    responses: BTreeMap<NodeId, ResponseMessage>,
    failed: BTreeSet<NodeId>,
    exceptions: Vec<Exception>,
    status: StatusReturnMessage,
    status_pending: BTreeSet<NodeId>,
}

impl Round {
    /// Snapshot `node`'s place in `tree` and seed the leaf set with the local payload.
    pub fn start(
        tree: &Tree,
        node: NodeId,
        key: &KeyPair,
        number: u64,
        kind: RoundKind,
        payload: Payload,
    ) -> Result<Round, RoundError> {
        if !tree.contains(node) {
            return Err(RoundError::NotInView(node));
        }
        let children = tree.children_of(node);
        let child_keys = children
            .iter()
            .map(|child| (*child, tree.subtree_public(*child)))
            .collect();
        let child_sizes = children
            .iter()
            .map(|child| (*child, tree.subtree_of(*child).len() as u64))
            .collect();

        debug!(%node, view = tree.view(), round = number, children = children.len(), "starting round");
        Ok(Round {
            node,
            view: tree.view(),
            number,
            kind,
            phase: RoundPhase::Announced,
            cosi: Cosi::new(key.secret().clone()),
            parent: tree.parent_of(node),
            children,
            subtree_public: tree.subtree_public(node),
            child_keys,
            child_sizes,
            payload,
            commitments: BTreeMap::new(),
            rejected: vec![],
            messages: 0,
            merkle: None,
            combined_root: None,
            message: None,
            local_proof: None,
            responses: BTreeMap::new(),
            failed: BTreeSet::new(),
            exceptions: vec![],
            status: StatusReturnMessage::default(),
            status_pending: BTreeSet::new(),
        })
    }

    /// Root only: stamp the round and produce the announcement for the children.
    pub fn create_announcement(&mut self, timestamp: u64) -> Result<AnnouncementMessage, RoundError> {
        if !self.is_root() {
            return Err(RoundError::NotRoot);
        }
        Ok(AnnouncementMessage {
            announcement: self.cosi.create_announcement(timestamp),
            kind: self.kind,
        })
    }

    /// Keep the parent's announcement and relay it to the children.
    pub fn announce(&mut self, announcement: Announcement) -> Result<AnnouncementMessage, RoundError> {
        if self.is_root() {
            return Err(RoundError::IsRoot);
        }
        Ok(AnnouncementMessage {
            announcement: self.cosi.announce(announcement),
            kind: self.kind,
        })
    }

    pub fn absorb_child_commitment(
        &mut self,
        child: NodeId,
        commitment: CommitmentMessage,
    ) -> Result<(), RoundError> {
        if !self.children.contains(&child) {
            return Err(RoundError::UnknownChild(child));
        }
        if self.phase != RoundPhase::Announced {
            return Err(RoundError::LateCommitment(child));
        }
        if self.commitments.contains_key(&child) {
            debug!(node = %self.node, %child, round = self.number, "duplicate commitment ignored");
            return Ok(());
        }
        self.commitments.insert(child, commitment);
        Ok(())
    }

    pub fn children_committed(&self) -> bool {
        self.children
            .iter()
            .all(|child| self.commitments.contains_key(child))
    }

    /// Close the commit phase: every child that has not committed is rejected, the combined
    /// Merkle tree is built and our commitment for the parent is produced.
    pub fn close_commitments(
        &mut self,
        rng: &mut (impl rand::RngCore + rand::CryptoRng),
    ) -> Result<CommitmentMessage, RoundError> {
        self.expect_phase(RoundPhase::Announced)?;

        for child in &self.children {
            match self.commitments.get(child) {
                Some(commitment) => self.rejected.extend(commitment.rejected.iter().copied()),
                None => {
                    warn!(node = %self.node, %child, round = self.number, "child did not commit");
                    if let Some(key) = self.child_keys.get(child) {
                        self.rejected.push(*key);
                    }
                }
            }
        }

        let commitments: Vec<_> = self
            .commitments
            .values()
            .map(|commitment| commitment.commitment)
            .collect();
        let commitment = if self.children.is_empty() {
            self.cosi.create_commitment(rng)
        } else {
            self.cosi.aggregate_commitments(rng, &commitments)
        };

        let leaves = std::iter::once((LeafOwner::Local, self.payload.leaf)).chain(
            self.commitments
                .iter()
                .map(|(child, commitment)| (LeafOwner::Child(*child), commitment.merkle_root)),
        );
        let merkle = CombinedTree::build(leaves);
        self.messages = self.payload.count
            + self
                .commitments
                .values()
                .map(|commitment| commitment.messages)
                .sum::<u64>();

        let out = CommitmentMessage {
            commitment,
            merkle_root: merkle.root(),
            rejected: self.rejected.clone(),
            messages: self.messages,
        };
        self.merkle = Some(merkle);
        self.phase = RoundPhase::Committed;
        Ok(out)
    }

    /// Proof from a leaf of our combined tree up to our own Merkle root.
    pub fn proof_for(&self, owner: &LeafOwner) -> Option<&Proof> {
        self.merkle.as_ref()?.proof_for(owner)
    }

    /// Root only: sign the combined root followed by `context` and produce one challenge per
    /// committed child.
    pub fn create_challenge(
        &mut self,
        context: &[u8],
    ) -> Result<Vec<(NodeId, ChallengeMessage)>, RoundError> {
        if !self.is_root() {
            return Err(RoundError::NotRoot);
        }
        self.expect_phase(RoundPhase::Committed)?;
        let root = self.merkle_root()?;
        let mut message = root.to_vec();
        message.extend_from_slice(context);

        let challenge = self.cosi.create_challenge(&message)?;
        Ok(self.fan_out_challenge(ChallengeMessage {
            challenge,
            combined_root: root,
            proof: Proof::default(),
            message,
        }))
    }

    /// Keep the parent's challenge and produce one per committed child, each with its proof
    /// extended up to the combined root.
    pub fn absorb_challenge(
        &mut self,
        challenge: ChallengeMessage,
    ) -> Result<Vec<(NodeId, ChallengeMessage)>, RoundError> {
        if self.is_root() {
            return Err(RoundError::IsRoot);
        }
        self.expect_phase(RoundPhase::Committed)?;
        self.cosi.challenge(challenge.challenge);
        Ok(self.fan_out_challenge(challenge))
    }

    fn fan_out_challenge(&mut self, incoming: ChallengeMessage) -> Vec<(NodeId, ChallengeMessage)> {
        let ChallengeMessage {
            challenge,
            combined_root,
            proof: upper,
            message,
        } = incoming;

        self.local_proof = self
            .proof_for(&LeafOwner::Local)
            .map(|proof| proof.extended(&upper));
        let out = self
            .commitments
            .keys()
            .filter_map(|child| {
                let proof = self.proof_for(&LeafOwner::Child(*child))?.extended(&upper);
                Some((
                    *child,
                    ChallengeMessage {
                        challenge,
                        combined_root,
                        proof,
                        message: message.clone(),
                    },
                ))
            })
            .collect();

        self.combined_root = Some(combined_root);
        self.message = Some(message);
        self.phase = RoundPhase::Challenged;
        out
    }

    /// Record a child's response. One that does not verify against the child's subtree key
    /// and commitment turns the whole subtree into an exception.
    pub fn absorb_child_response(
        &mut self,
        child: NodeId,
        response: ResponseMessage,
    ) -> Result<(), RoundError> {
        if !self.children.contains(&child) {
            return Err(RoundError::UnknownChild(child));
        }
        if self.phase != RoundPhase::Challenged {
            return Err(RoundError::LateResponse(child));
        }
        let commitment = self
            .commitments
            .get(&child)
            .ok_or(RoundError::UncommittedResponse(child))?;
        if self.responses.contains_key(&child) || self.failed.contains(&child) {
            debug!(node = %self.node, %child, round = self.number, "duplicate response ignored");
            return Ok(());
        }

        if self.child_contribution_holds(child, commitment, &response) {
            self.exceptions.extend(response.exceptions.iter().copied());
            self.responses.insert(child, response);
        } else {
            warn!(node = %self.node, %child, round = self.number, "child response does not verify");
            self.fail_child(child);
        }
        Ok(())
    }

    pub fn children_responded(&self) -> bool {
        self.commitments
            .keys()
            .all(|child| self.responses.contains_key(child) || self.failed.contains(child))
    }

    /// Close the response phase: committed children that never responded become exceptions,
    /// then our aggregate is checked against our subtree key reduced by everything excluded.
    pub fn close_responses(&mut self) -> Result<ResponseMessage, RoundError> {
        self.expect_phase(RoundPhase::Challenged)?;

        let silent: Vec<NodeId> = self
            .commitments
            .keys()
            .filter(|child| !self.responses.contains_key(child) && !self.failed.contains(child))
            .copied()
            .collect();
        for child in silent {
            warn!(node = %self.node, %child, round = self.number, "child did not respond");
            self.fail_child(child);
        }

        let responses: Vec<_> = self
            .responses
            .values()
            .map(|response| response.response)
            .collect();
        let response = if self.children.is_empty() {
            self.cosi.create_response()?
        } else {
            self.cosi.aggregate_responses(&responses)?
        };
        for exception in &self.exceptions {
            self.cosi.add_exception(exception);
        }

        let reduced = self.reduced_public();
        self.cosi.verify_responses(&reduced)?;

        self.status = StatusReturnMessage {
            responders: 1,
            peers: 1 + self
                .children
                .iter()
                .filter(|child| !self.responses.contains_key(child))
                .filter_map(|child| self.child_sizes.get(child))
                .sum::<u64>(),
        };
        self.status_pending = self.responses.keys().copied().collect();
        self.phase = RoundPhase::Responded;

        Ok(ResponseMessage {
            response,
            exceptions: self.exceptions.clone(),
        })
    }

    /// Root only: the collective signature and everything a verifier needs, together with
    /// the proof for the local payload.
    pub fn finalize_signature(&mut self) -> Result<(SignatureBroadcastMessage, Proof), RoundError> {
        if !self.is_root() {
            return Err(RoundError::NotRoot);
        }
        self.expect_phase(RoundPhase::Responded)?;
        let signature = self
            .cosi
            .signature()
            .ok_or(crate::error::CosiError::MissingResponse)?;
        let aggregate_commitment = self
            .cosi
            .aggregate_commitment()
            .ok_or(crate::error::CosiError::MissingCommitment)?;

        let broadcast = SignatureBroadcastMessage {
            signature,
            aggregate_public: self.subtree_public,
            aggregate_commitment,
            exceptions: self.all_exceptions(),
            message: self.message.clone().unwrap_or_default(),
            combined_root: self.merkle_root()?,
            messages: self.messages,
        };
        self.phase = RoundPhase::Finalized;
        Ok((broadcast, self.local_proof.clone().unwrap_or_default()))
    }

    /// Non-root: check the published signature against the round we took part in.
    pub fn absorb_signature(&mut self, broadcast: &SignatureBroadcastMessage) -> Result<(), RoundError> {
        if self.is_root() {
            return Err(RoundError::IsRoot);
        }
        self.expect_phase(RoundPhase::Responded)?;
        verify_signature_with_exceptions(
            &broadcast.aggregate_public,
            &broadcast.message,
            &broadcast.signature,
            &broadcast.exceptions,
        )?;
        self.phase = RoundPhase::Finalized;
        Ok(())
    }

    /// Fold a child's status report into ours.
    pub fn absorb_status(&mut self, child: NodeId, status: StatusReturnMessage) {
        if self.status_pending.remove(&child) {
            self.status.responders += status.responders;
            self.status.peers += status.peers;
        }
    }

    /// Our subtree's status once every child that responded has reported.
    pub fn status_report(&self) -> Option<StatusReturnMessage> {
        if self.phase >= RoundPhase::Responded && self.status_pending.is_empty() {
            Some(self.status)
        } else {
            None
        }
    }

    /// Rejections as identity-commitment exceptions, then the exceptions proper.
    pub fn all_exceptions(&self) -> Vec<Exception> {
        self.rejected
            .iter()
            .map(|public| Exception::rejected(*public))
            .chain(self.exceptions.iter().copied())
            .collect()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn kind(&self) -> RoundKind {
        self.kind
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn engine(&self) -> &Cosi {
        &self.cosi
    }

    pub fn rejected(&self) -> &[GroupPoint] {
        &self.rejected
    }

    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn combined_root(&self) -> Option<Hash> {
        self.combined_root
    }

    pub fn message(&self) -> Option<&[u8]> {
        self.message.as_deref()
    }

    /// Proof from the local payload leaf up to the combined root, once challenged.
    pub fn local_proof(&self) -> Option<&Proof> {
        self.local_proof.as_ref()
    }

    /// Our subtree key with every rejected and excepted key removed.
    pub fn reduced_public(&self) -> GroupPoint {
        self.rejected
            .iter()
            .chain(self.exceptions.iter().map(|exception| &exception.public))
            .fold(self.subtree_public, |acc, public| sub_points(&acc, public))
    }

    fn merkle_root(&self) -> Result<Hash, RoundError> {
        self.merkle
            .as_ref()
            .map(CombinedTree::root)
            .ok_or(RoundError::WrongPhase {
                expected: RoundPhase::Committed,
                actual: self.phase,
            })
    }

    fn expect_phase(&self, expected: RoundPhase) -> Result<(), RoundError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RoundError::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    /// The child's subtree key minus what it reported as rejected below it.
    fn child_committed_key(&self, child: NodeId, commitment: &CommitmentMessage) -> Option<GroupPoint> {
        let key = self.child_keys.get(&child)?;
        Some(
            commitment
                .rejected
                .iter()
                .fold(*key, |acc, public| sub_points(&acc, public)),
        )
    }

    fn child_contribution_holds(
        &self,
        child: NodeId,
        commitment: &CommitmentMessage,
        response: &ResponseMessage,
    ) -> bool {
        let (c, key) = match (self.cosi.get_challenge(), self.child_committed_key(child, commitment)) {
            (Some(c), Some(key)) => (c, key),
            _ => return false,
        };
        let x = response
            .exceptions
            .iter()
            .fold(key, |acc, exception| sub_points(&acc, &exception.public));
        let e = sum_points(response.exceptions.iter().map(|exception| &exception.commitment));
        let r = response.response.aggregate();
        let t = add_points(&g!(r * G + c * x).normalize(), &e);
        t == commitment.commitment.aggregate()
    }

    fn fail_child(&mut self, child: NodeId) {
        let exception = self.commitments.get(&child).and_then(|commitment| {
            Some(Exception {
                public: self.child_committed_key(child, commitment)?,
                commitment: commitment.commitment.aggregate(),
            })
        });
        if let Some(exception) = exception {
            self.exceptions.push(exception);
        }
        self.failed.insert(child);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::merkle::leaf_hash;
    use crate::tree::Roster;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn payload(tag: &[u8]) -> Payload {
        Payload {
            leaf: leaf_hash(tag),
            count: 1,
        }
    }

    #[test]
    fn round_kinds_resolve_from_tags() {
        for tag in RoundKind::tags() {
            assert_eq!(RoundKind::from_tag(tag).unwrap().tag(), tag);
        }
        assert_eq!(RoundKind::from_tag("randhound"), None);
        assert!(!RoundKind::Cosi.uses_payload());
        assert!(RoundKind::Stats.reports_stats());
    }

    #[test]
    fn phases_are_enforced() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let keys: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate(&mut rng)).collect();
        let roster = Roster::from_keys(keys.iter().map(KeyPair::public));
        let tree = Tree::for_view(&roster, 0, 1).unwrap();

        let mut root = Round::start(&tree, NodeId(0), &keys[0], 1, RoundKind::Cosi, payload(b"r")).unwrap();
        let mut leaf = Round::start(&tree, NodeId(1), &keys[1], 1, RoundKind::Cosi, payload(b"l")).unwrap();

        assert_eq!(leaf.create_challenge(b""), Err(RoundError::NotRoot));
        assert!(matches!(
            root.create_challenge(b""),
            Err(RoundError::WrongPhase { expected: RoundPhase::Committed, .. })
        ));
        assert!(matches!(
            Round::start(&tree, NodeId(7), &keys[0], 1, RoundKind::Cosi, payload(b"x")),
            Err(RoundError::NotInView(NodeId(7)))
        ));

        let commitment = leaf.close_commitments(&mut rng).unwrap();
        root.absorb_child_commitment(NodeId(1), commitment.clone()).unwrap();
        assert_eq!(
            root.absorb_child_commitment(NodeId(5), commitment.clone()),
            Err(RoundError::UnknownChild(NodeId(5)))
        );
        root.close_commitments(&mut rng).unwrap();
        assert_eq!(
            root.absorb_child_commitment(NodeId(1), commitment),
            Err(RoundError::LateCommitment(NodeId(1)))
        );
    }

    #[test]
    fn silent_child_is_rejected_at_commit() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rng)).collect();
        let roster = Roster::from_keys(keys.iter().map(KeyPair::public));
        let tree = Tree::for_view(&roster, 0, 2).unwrap();

        let mut root = Round::start(&tree, NodeId(0), &keys[0], 1, RoundKind::Cosi, payload(b"r")).unwrap();
        let mut left = Round::start(&tree, NodeId(1), &keys[1], 1, RoundKind::Cosi, payload(b"a")).unwrap();

        root.absorb_child_commitment(NodeId(1), left.close_commitments(&mut rng).unwrap())
            .unwrap();
        assert!(!root.children_committed());
        root.close_commitments(&mut rng).unwrap();
        assert_eq!(root.rejected(), &[keys[2].public()]);

        let challenges = root.create_challenge(b"").unwrap();
        assert_eq!(challenges.len(), 1);
        let (_, challenge) = challenges.into_iter().next().unwrap();
        left.absorb_challenge(challenge).unwrap();
        root.absorb_child_response(NodeId(1), left.close_responses().unwrap())
            .unwrap();
        let stray = ResponseMessage {
            response: crate::cosi::Response {
                response: crate::group::zero_scalar(),
                children_response: None,
            },
            exceptions: vec![],
        };
        assert_eq!(
            root.absorb_child_response(NodeId(2), stray),
            Err(RoundError::UncommittedResponse(NodeId(2)))
        );
        root.close_responses().unwrap();
        let (broadcast, _) = root.finalize_signature().unwrap();

        assert_eq!(broadcast.exceptions, vec![Exception::rejected(keys[2].public())]);
        verify_signature_with_exceptions(
            &broadcast.aggregate_public,
            &broadcast.message,
            &broadcast.signature,
            &broadcast.exceptions,
        )
        .unwrap();
        left.absorb_signature(&broadcast).unwrap();
        assert_eq!(left.phase(), RoundPhase::Finalized);
    }

    #[test]
    fn response_after_close_is_late() {
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let keys: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate(&mut rng)).collect();
        let roster = Roster::from_keys(keys.iter().map(KeyPair::public));
        let tree = Tree::for_view(&roster, 0, 1).unwrap();

        let mut root = Round::start(&tree, NodeId(0), &keys[0], 1, RoundKind::Cosi, payload(b"r")).unwrap();
        let mut leaf = Round::start(&tree, NodeId(1), &keys[1], 1, RoundKind::Cosi, payload(b"l")).unwrap();
        root.absorb_child_commitment(NodeId(1), leaf.close_commitments(&mut rng).unwrap())
            .unwrap();
        root.close_commitments(&mut rng).unwrap();
        let (_, challenge) = root.create_challenge(b"").unwrap().into_iter().next().unwrap();
        leaf.absorb_challenge(challenge).unwrap();
        let response = leaf.close_responses().unwrap();

        root.close_responses().unwrap();
        assert_eq!(
            root.absorb_child_response(NodeId(1), response),
            Err(RoundError::LateResponse(NodeId(1)))
        );
        let (broadcast, _) = root.finalize_signature().unwrap();
        assert_eq!(broadcast.exceptions.len(), 1);
        assert_eq!(broadcast.exceptions[0].public, keys[1].public());
        verify_signature_with_exceptions(
            &broadcast.aggregate_public,
            &broadcast.message,
            &broadcast.signature,
            &broadcast.exceptions,
        )
        .unwrap();
    }
}
