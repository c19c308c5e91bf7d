//! Sources of the data a node contributes to a round.
//!
//! Each round a node asks its [`PayloadSource`] for one leaf hash and, once the collective
//! signature is published, hands back the proof from that leaf to the signed root.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cosi::verify_signature_with_exceptions;
use crate::merkle::{build_proofs, leaf_hash, Hash, Proof};
use crate::messages::SignatureBroadcastMessage;

/// One node's contribution to a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payload {
    pub leaf: Hash,
    /// Number of items folded into `leaf`.
    pub count: u64,
}

impl Payload {
    pub fn empty() -> Payload {
        Payload {
            leaf: leaf_hash(&[]),
            count: 0,
        }
    }
}

/// What a node hands back to its payload source once a round it took part in is signed.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub view: u64,
    pub round: u64,
    /// From the source's leaf up to `broadcast.combined_root`.
    pub proof: Proof,
    pub broadcast: SignatureBroadcastMessage,
}

pub trait PayloadSource: Send {
    /// Seal the data for `(view, round)` into a leaf.
    fn local_leaf(&mut self, view: u64, round: u64) -> Payload;

    fn deliver(&mut self, delivery: Delivery);

    /// The round sealed earlier will never be signed.
    fn abandon(&mut self, _view: u64, _round: u64) {}
}

/// Contributes nothing, for rounds that only sign the tree itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyPayload;

impl PayloadSource for EmptyPayload {
    fn local_leaf(&mut self, _view: u64, _round: u64) -> Payload {
        Payload::empty()
    }

    fn deliver(&mut self, _delivery: Delivery) {}
}

/// Proof that one submitted item is covered by a collective signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub item: Hash,
    pub round: u64,
    /// From `item` up to the combined root.
    pub proof: Proof,
    pub broadcast: SignatureBroadcastMessage,
}

impl Receipt {
    /// The item is in the signed tree and the signature holds for the declared exceptions.
    pub fn verify(&self) -> bool {
        let root = self.broadcast.combined_root;
        self.proof.verify(&self.item, &root)
            && self.broadcast.message.starts_with(&root)
            && verify_signature_with_exceptions(
                &self.broadcast.aggregate_public,
                &self.broadcast.message,
                &self.broadcast.signature,
                &self.broadcast.exceptions,
            )
            .is_ok()
    }
}

#[derive(Default)]
struct Batches {
    pending: Vec<Hash>,
    sealed: BTreeMap<(u64, u64), Vec<Hash>>,
    receipts: Vec<Receipt>,
}

/// Collects submitted items and stamps them in batches, one batch per round.
///
/// Clones share the same queue, so one handle can sit in a node while another submits.
#[derive(Clone, Default)]
pub struct BatchSource {
    batches: Arc<Mutex<Batches>>,
}

impl BatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `data` for the next round and return the item hash its receipt will carry.
    pub fn submit(&self, data: &[u8]) -> Hash {
        let item = leaf_hash(data);
        self.lock().pending.push(item);
        item
    }

    /// Take every receipt issued so far.
    pub fn take_receipts(&self) -> Vec<Receipt> {
        std::mem::take(&mut self.lock().receipts)
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Batches> {
        // a poisoned queue is still a valid queue
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PayloadSource for BatchSource {
    fn local_leaf(&mut self, view: u64, round: u64) -> Payload {
        let mut batches = self.lock();
        let mut items = std::mem::take(&mut batches.pending);
        if items.is_empty() {
            return Payload::empty();
        }
        items.sort();
        let (leaf, _) = build_proofs(&items);
        let count = items.len() as u64;
        batches.sealed.insert((view, round), items);
        debug!(view, round, count, "sealed batch");
        Payload { leaf, count }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let mut batches = self.lock();
        let items = match batches.sealed.remove(&(delivery.view, delivery.round)) {
            Some(items) => items,
            None => return,
        };
        let (_, proofs) = build_proofs(&items);
        for (item, proof) in items.into_iter().zip(proofs) {
            batches.receipts.push(Receipt {
                item,
                round: delivery.round,
                proof: proof.extended(&delivery.proof),
                broadcast: delivery.broadcast.clone(),
            });
        }
    }

    fn abandon(&mut self, view: u64, round: u64) {
        let mut batches = self.lock();
        if let Some(mut items) = batches.sealed.remove(&(view, round)) {
            warn!(view, round, count = items.len(), "round abandoned, requeueing batch");
            items.append(&mut batches.pending);
            batches.pending = items;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_batch_uses_empty_payload() {
        let mut source = BatchSource::new();
        assert_eq!(source.local_leaf(0, 1), Payload::empty());
    }

    #[test]
    fn abandoned_batches_are_requeued() {
        let mut source = BatchSource::new();
        source.submit(b"a");
        source.submit(b"b");
        let payload = source.local_leaf(0, 1);
        assert_eq!(payload.count, 2);
        assert_eq!(source.pending(), 0);

        source.submit(b"c");
        source.abandon(0, 1);
        assert_eq!(source.pending(), 3);
        assert_eq!(source.local_leaf(0, 2).count, 3);
    }
}
