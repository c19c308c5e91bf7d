//! Messages exchanged between nodes. Every message carries the sender, the recipient and the
//! `(view, round)` it belongs to; on the wire it is JSON.
use serde::{Deserialize, Serialize};

use crate::cosi::{Announcement, Challenge, Commitment, Exception, Response, Signature};
use crate::group::{serde_point, serde_points, GroupPoint};
use crate::merkle::{Hash, Proof};
use crate::round::RoundKind;
use crate::tree::NodeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigningMessage {
    pub from: NodeId,
    pub to: NodeId,
    pub view: u64,
    pub round: u64,
    /// Highest view-change vote the sender has seen.
    pub last_seen_vote: u64,
    pub body: MessageBody,
}

impl SigningMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    Announcement(AnnouncementMessage),
    Commitment(CommitmentMessage),
    Challenge(ChallengeMessage),
    Response(ResponseMessage),
    SignatureBroadcast(SignatureBroadcastMessage),
    StatusReturn(StatusReturnMessage),
    ViewChangeVote { view: u64 },
    ViewChanged { view: u64 },
    CloseAll,
}

impl MessageBody {
    pub fn name(&self) -> &'static str {
        match self {
            MessageBody::Announcement(_) => "announcement",
            MessageBody::Commitment(_) => "commitment",
            MessageBody::Challenge(_) => "challenge",
            MessageBody::Response(_) => "response",
            MessageBody::SignatureBroadcast(_) => "signature_broadcast",
            MessageBody::StatusReturn(_) => "status_return",
            MessageBody::ViewChangeVote { .. } => "view_change_vote",
            MessageBody::ViewChanged { .. } => "view_changed",
            MessageBody::CloseAll => "close_all",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementMessage {
    pub announcement: Announcement,
    pub kind: RoundKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitmentMessage {
    pub commitment: Commitment,
    /// Root of the sender's combined Merkle tree.
    pub merkle_root: Hash,
    /// Aggregate keys of subtrees that failed to commit below the sender.
    #[serde(with = "serde_points")]
    pub rejected: Vec<GroupPoint>,
    /// Payload items committed to by the sender's subtree.
    pub messages: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeMessage {
    pub challenge: Challenge,
    /// The root of the whole tree's combined Merkle tree.
    pub combined_root: Hash,
    /// From the recipient's own Merkle root up to `combined_root`.
    pub proof: Proof,
    /// The signed message, `combined_root` followed by any context.
    pub message: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub response: Response,
    /// Subtrees below the sender that committed but did not respond validly.
    pub exceptions: Vec<Exception>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignatureBroadcastMessage {
    pub signature: Signature,
    #[serde(with = "serde_point")]
    pub aggregate_public: GroupPoint,
    #[serde(with = "serde_point")]
    pub aggregate_commitment: GroupPoint,
    /// Everything excluded from the signature, rejections included.
    pub exceptions: Vec<Exception>,
    pub message: Vec<u8>,
    pub combined_root: Hash,
    pub messages: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReturnMessage {
    pub responders: u64,
    pub peers: u64,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cosi::Cosi;
    use crate::group::KeyPair;
    use crate::merkle::leaf_hash;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn wire_encoding_keeps_points_and_scalars() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let key = KeyPair::generate(&mut rng);
        let mut cosi = Cosi::new(key.secret().clone());
        let commitment = cosi.aggregate_commitments(&mut rng, &[]);
        let challenge = cosi.create_challenge(b"m").unwrap();
        let response = cosi.create_response().unwrap();

        let bodies = vec![
            MessageBody::Commitment(CommitmentMessage {
                commitment,
                merkle_root: leaf_hash(b"x"),
                rejected: vec![key.public(), crate::group::identity()],
                messages: 4,
            }),
            MessageBody::Challenge(ChallengeMessage {
                challenge,
                combined_root: leaf_hash(b"y"),
                proof: Proof(vec![leaf_hash(b"z")]),
                message: b"m".to_vec(),
            }),
            MessageBody::Response(ResponseMessage {
                response,
                exceptions: vec![Exception::rejected(key.public())],
            }),
            MessageBody::ViewChangeVote { view: 3 },
            MessageBody::CloseAll,
        ];

        for body in bodies {
            let message = SigningMessage {
                from: NodeId(1),
                to: NodeId(0),
                view: 2,
                round: 9,
                last_seen_vote: 1,
                body,
            };
            let bytes = message.to_bytes().unwrap();
            assert_eq!(SigningMessage::from_bytes(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(SigningMessage::from_bytes(b"{\"from\": 1}").is_err());
    }
}
