//! CoSi: Scalable Collective Schnorr Signing
//!
//! ## Description
//!
//! This crate lets a large group of nodes, arranged in a tree, jointly produce one compact
//! Schnorr multi-signature over a message. Verifying it takes one aggregate public key and the
//! list of participants that were excluded from the round.
//!
//! > ⚠ At this stage this implementation is for API exploration purposes only. It has not been
//! reviewed or vetted, and should be considered insecure for practical purposes.
//!
//! ## CoSi Summary
//!
//! Every round runs over the tree of the current view in four passes:
//!
//! 1. the root **announces** the round down the tree,
//! 2. every node **commits** to a fresh nonce point and sends its subtree's aggregate commitment
//!    and Merkle root up,
//! 3. the root hashes the aggregate commitment and the combined Merkle root into the
//!    **challenge** and sends it down with each subtree's inclusion proof,
//! 4. every node **responds** and sends its subtree's aggregate response up.
//!
//! The root then publishes the signature. Nodes that miss a phase are not waited on: their
//! keys (and commitments, when they committed) go on an exception list and the signature is
//! produced for everybody else.
//!
//! Rounds are ticked by the root of the current view. A node that stops hearing from its parent
//! votes for the next view, whose root takes over once a majority has voted.
//!
//! ## Usage Notes
//!
//! [`cosi::Cosi`] is the per-round signing engine on its own, [`round::Round`] binds it to a
//! tree, and [`node::Node`] runs rounds continuously over any [`transport::Transport`].
//! [`transport::LocalNetwork`] runs a whole tree in one process.

pub mod config;
pub mod cosi;
pub mod error;
pub mod group;
pub mod merkle;
pub mod messages;
pub mod node;
pub mod payload;
pub mod round;
pub mod stats;
pub mod transport;
pub mod tree;
pub mod view;
