//! Group arithmetic over secp256k1.
//!
//! Every aggregate in the protocol may legitimately be the identity (a subtree with no
//! participants, an empty exception list), so points are carried as
//! `Point<Normal, Public, Zero>` and scalars on the wire as `Scalar<Public, Zero>`.
use rand::{CryptoRng, RngCore};
use secp256kfun::{g, marker::*, op, Point, Scalar, G};
use sha2::{Digest, Sha256};

/// A group element that may be the identity.
pub type GroupPoint = Point<Normal, Public, Zero>;

/// A public scalar that may be zero (challenges and responses).
pub type GroupScalar = Scalar<Public, Zero>;

/// Long-term identity of a node: private scalar `x` and public point `X = x*G`.
#[derive(Clone)]
pub struct KeyPair {
    secret: Scalar,
    public: Point,
}

impl KeyPair {
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self::from_secret(Scalar::random(rng))
    }

    pub fn from_secret(secret: Scalar) -> Self {
        let public = g!(secret * G).normalize();
        KeyPair { secret, public }
    }

    pub fn secret(&self) -> &Scalar {
        &self.secret
    }

    pub fn public(&self) -> GroupPoint {
        self.public.mark::<Zero>()
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

pub fn identity() -> GroupPoint {
    Point::zero()
}

pub fn add_points(a: &GroupPoint, b: &GroupPoint) -> GroupPoint {
    op::point_add(a, b).normalize()
}

pub fn sub_points(a: &GroupPoint, b: &GroupPoint) -> GroupPoint {
    op::point_sub(a, b).normalize()
}

/// Sum starting from the identity, so an empty iterator yields the identity.
pub fn sum_points<'a>(points: impl IntoIterator<Item = &'a GroupPoint>) -> GroupPoint {
    points
        .into_iter()
        .fold(identity(), |acc, point| add_points(&acc, point))
}

pub fn zero_scalar() -> GroupScalar {
    Scalar::zero().mark::<Public>()
}

pub fn add_scalars(a: &GroupScalar, b: &GroupScalar) -> GroupScalar {
    op::scalar_add(a, b).mark::<Public>()
}

/// Compressed encoding; the identity encodes as 33 zero bytes.
pub fn encode_point(point: &GroupPoint) -> [u8; 33] {
    match (*point).mark::<NonZero>() {
        Some(point) => point.to_bytes(),
        None => [0u8; 33],
    }
}

/// Fiat–Shamir challenge `H(V ‖ message)` reduced modulo the group order.
pub fn hash_to_scalar(commitment: &GroupPoint, message: &[u8]) -> GroupScalar {
    let mut hasher = Sha256::new();
    hasher.update(encode_point(commitment));
    hasher.update(message);
    Scalar::from_bytes_mod_order(hasher.finalize().into()).mark::<Public>()
}

fn to_non_zero(point: &GroupPoint) -> Option<Point> {
    (*point).mark::<NonZero>()
}

fn from_non_zero(point: Option<Point>) -> GroupPoint {
    point.map(|point| point.mark::<Zero>()).unwrap_or_else(identity)
}

/// Serde adapter for a single [`GroupPoint`]. The identity is written as `null`.
pub mod serde_point {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(point: &GroupPoint, serializer: S) -> Result<S::Ok, S::Error> {
        to_non_zero(point).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GroupPoint, D::Error> {
        Ok(from_non_zero(Option::<Point>::deserialize(deserializer)?))
    }
}

/// Serde adapter for a list of [`GroupPoint`]s.
pub mod serde_points {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        points: &[GroupPoint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(points.iter().map(to_non_zero))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<GroupPoint>, D::Error> {
        Ok(Vec::<Option<Point>>::deserialize(deserializer)?
            .into_iter()
            .map(from_non_zero)
            .collect())
    }
}

/// Serde adapter for an optional [`GroupPoint`].
pub mod serde_opt_point {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        point: &Option<GroupPoint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        point.as_ref().map(|point| encode_point(point).to_vec()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<GroupPoint>, D::Error> {
        let bytes = Option::<Vec<u8>>::deserialize(deserializer)?;
        bytes
            .map(|bytes| {
                if bytes.iter().all(|b| *b == 0) {
                    Ok(identity())
                } else {
                    Point::from_slice(&bytes)
                        .map(|point| point.mark::<Zero>())
                        .ok_or_else(|| {
                            <D::Error as serde::de::Error>::custom("invalid secp256k1 point")
                        })
                }
            })
            .transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn identity_is_neutral() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let key = KeyPair::generate(&mut rng);
        let x = key.public();
        assert_eq!(add_points(&x, &identity()), x);
        assert_eq!(sub_points(&x, &x), identity());
        assert_eq!(sum_points(&[]), identity());
        assert_eq!(encode_point(&identity()), [0u8; 33]);
    }

    #[test]
    fn challenge_depends_on_commitment_and_message() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let a = KeyPair::generate(&mut rng).public();
        let b = KeyPair::generate(&mut rng).public();
        assert_eq!(hash_to_scalar(&a, b"m"), hash_to_scalar(&a, b"m"));
        assert_ne!(hash_to_scalar(&a, b"m"), hash_to_scalar(&b, b"m"));
        assert_ne!(hash_to_scalar(&a, b"m"), hash_to_scalar(&a, b"n"));
    }
}
