//! CoSi signing engine
//!
//! Manage one participant's commit, challenge and response for a single round. The engine
//! is tree-agnostic: the caller hands it the children's commitments and responses and it
//! keeps the running aggregates.
//!
//! For a participant with private key `x` and per-round random `v`:
//!
//! - commitment `V = v*G`, aggregated as `V̂ = V + Σ V̂_child`
//! - challenge `c = H(V̂ ‖ message)`, created once by the root
//! - response `r = v - c*x`, aggregated as `r̂ = r + Σ r̂_child`
//!
//! so that `r̂*G + c*X̂ = V̂` for the aggregate public key `X̂`. Participants that drop
//! out after committing are declared as [`Exception`]s, whose commitments are added back
//! and whose public keys are removed from `X̂` before checking.
use rand::{CryptoRng, RngCore};
use secp256kfun::{g, marker::*, s, Scalar, G};
use serde::{Deserialize, Serialize};

use crate::error::CosiError;
use crate::group::{
    add_points, add_scalars, hash_to_scalar, identity, serde_opt_point, serde_point, sub_points,
    sum_points, zero_scalar, GroupPoint, GroupScalar,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    /// The sender's own commitment.
    #[serde(with = "serde_point")]
    pub commitment: GroupPoint,
    /// Aggregate of the sender's subtree without its own commitment, absent for leaves.
    #[serde(with = "serde_opt_point")]
    pub children_commitment: Option<GroupPoint>,
}

impl Commitment {
    pub fn aggregate(&self) -> GroupPoint {
        match &self.children_commitment {
            Some(children) => add_points(&self.commitment, children),
            None => self.commitment,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: GroupScalar,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response: GroupScalar,
    pub children_response: Option<GroupScalar>,
}

impl Response {
    pub fn aggregate(&self) -> GroupScalar {
        match &self.children_response {
            Some(children) => add_scalars(&self.response, children),
            None => self.response,
        }
    }
}

/// A collective signature: the challenge and the aggregated response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub challenge: GroupScalar,
    pub response: GroupScalar,
}

/// A participant (or whole subtree) excluded from the signature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(with = "serde_point")]
    pub public: GroupPoint,
    #[serde(with = "serde_point")]
    pub commitment: GroupPoint,
}

impl Exception {
    /// An exclusion for keys that never committed, so nothing was added to `V̂` for them.
    pub fn rejected(public: GroupPoint) -> Self {
        Exception {
            public,
            commitment: identity(),
        }
    }
}

pub struct Cosi {
    private: Option<Scalar>,
    timestamp: Option<u64>,
    random: Option<Scalar>,
    commitment: Option<GroupPoint>,
    aggregate_commitment: Option<GroupPoint>,
    // only set where the challenge was created, i.e. at the root
    message: Option<Vec<u8>>,
    challenge: Option<GroupScalar>,
    response: Option<GroupScalar>,
    aggregate_response: Option<GroupScalar>,
    exception_commitment: GroupPoint,
}

impl Default for Cosi {
    fn default() -> Self {
        Cosi {
            private: None,
            timestamp: None,
            random: None,
            commitment: None,
            aggregate_commitment: None,
            message: None,
            challenge: None,
            response: None,
            aggregate_response: None,
            exception_commitment: identity(),
        }
    }
}

impl Cosi {
    /// Create a new [`Cosi`] for one round, signing with the node's long-term key.
    pub fn new(private: Scalar) -> Self {
        Cosi {
            private: Some(private),
            ..Default::default()
        }
    }

    /// Root only: stamp the start of the round.
    pub fn create_announcement(&mut self, timestamp: u64) -> Announcement {
        self.timestamp = Some(timestamp);
        Announcement { timestamp }
    }

    /// Store the round's timestamp and relay the announcement unchanged.
    pub fn announce(&mut self, announcement: Announcement) -> Announcement {
        self.timestamp = Some(announcement.timestamp);
        announcement
    }

    /// Commit without children, typically called by the leaves.
    pub fn create_commitment(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> Commitment {
        let commitment = self.gen_commit(rng);
        self.aggregate_commitment = Some(commitment);
        Commitment {
            commitment,
            children_commitment: None,
        }
    }

    /// Commit and fold in the (already aggregated) commitments of the children.
    ///
    /// The returned message keeps our own commitment apart from the children's aggregate so
    /// the parent does not count ours twice.
    pub fn aggregate_commitments(
        &mut self,
        rng: &mut (impl RngCore + CryptoRng),
        children: &[Commitment],
    ) -> Commitment {
        let commitment = self.gen_commit(rng);
        let children_commitment = children
            .iter()
            .fold(identity(), |acc, child| add_points(&acc, &child.aggregate()));
        self.aggregate_commitment = Some(add_points(&commitment, &children_commitment));
        Commitment {
            commitment,
            children_commitment: Some(children_commitment),
        }
    }

    /// Root only: derive the challenge from the aggregate commitment and the message.
    pub fn create_challenge(&mut self, message: &[u8]) -> Result<Challenge, CosiError> {
        let aggregate_commitment = self
            .aggregate_commitment
            .ok_or(CosiError::MissingCommitment)?;
        let challenge = hash_to_scalar(&aggregate_commitment, message);
        self.message = Some(message.to_vec());
        self.challenge = Some(challenge);
        Ok(Challenge { challenge })
    }

    /// Keep the challenge received from the parent and relay it unchanged.
    pub fn challenge(&mut self, challenge: Challenge) -> Challenge {
        self.challenge = Some(challenge.challenge);
        challenge
    }

    /// Respond without children, typically called by the leaves.
    pub fn create_response(&mut self) -> Result<Response, CosiError> {
        let response = self.gen_response()?;
        self.aggregate_response = Some(response);
        Ok(Response {
            response,
            children_response: None,
        })
    }

    /// Respond and fold in the (already aggregated) responses of the children.
    pub fn aggregate_responses(&mut self, children: &[Response]) -> Result<Response, CosiError> {
        let response = self.gen_response()?;
        let children_response = children
            .iter()
            .fold(zero_scalar(), |acc, child| add_scalars(&acc, &child.aggregate()));
        self.aggregate_response = Some(add_scalars(&response, &children_response));
        Ok(Response {
            response,
            children_response: Some(children_response),
        })
    }

    /// Account for an excluded participant whose commitment is part of `V̂`.
    pub fn add_exception(&mut self, exception: &Exception) {
        self.exception_commitment = add_points(&self.exception_commitment, &exception.commitment);
    }

    /// Check `r̂*G + c*X̂ + E = V̂` for the (exception-reduced) aggregate key `X̂`.
    ///
    /// Where the challenge was created here the challenge is also recomputed from the
    /// reconstructed commitment.
    pub fn verify_responses(&self, aggregate_public: &GroupPoint) -> Result<(), CosiError> {
        let aggregate_commitment = self
            .aggregate_commitment
            .ok_or(CosiError::MissingCommitment)?;
        let c = self.challenge.ok_or(CosiError::MissingChallenge)?;
        let r = self.aggregate_response.ok_or(CosiError::MissingResponse)?;
        let x = *aggregate_public;

        let t = add_points(&g!(r * G + c * x).normalize(), &self.exception_commitment);
        if t != aggregate_commitment {
            return Err(CosiError::SignatureMismatch);
        }
        if let Some(message) = &self.message {
            if hash_to_scalar(&t, message) != c {
                return Err(CosiError::SignatureMismatch);
            }
        }
        Ok(())
    }

    /// Only complete at the root once every response has been aggregated.
    pub fn signature(&self) -> Option<Signature> {
        Some(Signature {
            challenge: self.challenge?,
            response: self.aggregate_response?,
        })
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn commitment(&self) -> Option<GroupPoint> {
        self.commitment
    }

    pub fn aggregate_commitment(&self) -> Option<GroupPoint> {
        self.aggregate_commitment
    }

    pub fn get_challenge(&self) -> Option<GroupScalar> {
        self.challenge
    }

    pub fn response(&self) -> Option<GroupScalar> {
        self.response
    }

    pub fn aggregate_response(&self) -> Option<GroupScalar> {
        self.aggregate_response
    }

    fn gen_commit(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> GroupPoint {
        let random = Scalar::random(rng);
        let commitment = g!(random * G).normalize().mark::<Zero>();
        self.random = Some(random);
        self.commitment = Some(commitment);
        commitment
    }

    fn gen_response(&mut self) -> Result<GroupScalar, CosiError> {
        let x = self.private.as_ref().ok_or(CosiError::MissingKey)?;
        let v = self.random.as_ref().ok_or(CosiError::MissingRandom)?;
        let c = self.challenge.ok_or(CosiError::MissingChallenge)?;
        let response = s!(v - c * x).mark::<Public>();
        self.response = Some(response);
        Ok(response)
    }
}

pub fn verify_signature(
    public: &GroupPoint,
    message: &[u8],
    signature: &Signature,
) -> Result<(), CosiError> {
    verify_signature_with_exceptions(public, message, signature, &[])
}

/// Verify a collective signature over the signer set `public` minus `exceptions`.
///
/// Each exception's key is removed from the aggregate key and its commitment added back to
/// the reconstructed commitment before the challenge is re-derived.
pub fn verify_signature_with_exceptions(
    public: &GroupPoint,
    message: &[u8],
    signature: &Signature,
    exceptions: &[Exception],
) -> Result<(), CosiError> {
    let reduced = exceptions
        .iter()
        .fold(*public, |acc, exception| sub_points(&acc, &exception.public));
    let exception_commitment = sum_points(exceptions.iter().map(|exception| &exception.commitment));

    let c = signature.challenge;
    let r = signature.response;
    let t = add_points(&g!(r * G + c * reduced).normalize(), &exception_commitment);
    if hash_to_scalar(&t, message) == c {
        Ok(())
    } else {
        Err(CosiError::SignatureMismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::group::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn single_signer_round_trip() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let key = KeyPair::generate(&mut rng);
        let mut cosi = Cosi::new(key.secret().clone());

        cosi.create_announcement(1);
        cosi.create_commitment(&mut rng);
        cosi.create_challenge(b"hello").unwrap();
        cosi.create_response().unwrap();
        cosi.verify_responses(&key.public()).unwrap();

        let signature = cosi.signature().unwrap();
        verify_signature(&key.public(), b"hello", &signature).unwrap();
        assert_eq!(
            verify_signature(&key.public(), b"goodbye", &signature),
            Err(CosiError::SignatureMismatch)
        );
    }

    #[test]
    fn response_requires_key_random_and_challenge() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let key = KeyPair::generate(&mut rng);

        let mut keyless = Cosi::default();
        keyless.create_commitment(&mut rng);
        keyless.create_challenge(b"m").unwrap();
        assert_eq!(keyless.create_response(), Err(CosiError::MissingKey));

        let mut no_random = Cosi::new(key.secret().clone());
        no_random.challenge(Challenge {
            challenge: hash_to_scalar(&key.public(), b"m"),
        });
        assert_eq!(no_random.create_response(), Err(CosiError::MissingRandom));

        let mut no_challenge = Cosi::new(key.secret().clone());
        no_challenge.create_commitment(&mut rng);
        assert_eq!(no_challenge.create_response(), Err(CosiError::MissingChallenge));
        assert_eq!(
            no_challenge.aggregate_responses(&[]),
            Err(CosiError::MissingChallenge)
        );
    }

    #[test]
    fn challenge_requires_commitment() {
        let mut cosi = Cosi::default();
        assert_eq!(
            cosi.create_challenge(b"m"),
            Err(CosiError::MissingCommitment)
        );
    }

    #[test]
    fn verify_responses_is_repeatable() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let root_key = KeyPair::generate(&mut rng);
        let leaf_key = KeyPair::generate(&mut rng);
        let mut root = Cosi::new(root_key.secret().clone());
        let mut leaf = Cosi::new(leaf_key.secret().clone());

        let leaf_commitment = leaf.create_commitment(&mut rng);
        root.aggregate_commitments(&mut rng, &[leaf_commitment]);
        let challenge = root.create_challenge(b"m").unwrap();
        leaf.challenge(challenge);
        let leaf_response = leaf.create_response().unwrap();
        root.aggregate_responses(&[leaf_response]).unwrap();

        let aggregate = add_points(&root_key.public(), &leaf_key.public());
        let first = root.verify_responses(&aggregate);
        let second = root.verify_responses(&aggregate);
        assert_eq!(first, Ok(()));
        assert_eq!(first, second);
        assert_eq!(
            root.verify_responses(&root_key.public()),
            Err(CosiError::SignatureMismatch)
        );
    }
}
