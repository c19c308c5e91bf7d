//! Error taxonomy for signing, rounds, configuration and the driver.
use thiserror::Error;

use crate::tree::NodeId;

/// Failures of the signing engine for one participant in one round.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum CosiError {
    #[error("no private key given to this cosi")]
    MissingKey,

    #[error("no random commitment computed in this round")]
    MissingRandom,

    #[error("no challenge stored in this round")]
    MissingChallenge,

    #[error("no aggregate commitment to build a challenge from")]
    MissingCommitment,

    #[error("no response computed in this round")]
    MissingResponse,

    /// Either the aggregate equation or the recomputed challenge did not match.
    #[error("collective signature verification failed")]
    SignatureMismatch,
}

/// Failures of the round orchestrator. Liveness failures of children never surface here,
/// they end up in the exception list instead.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum RoundError {
    #[error(transparent)]
    Cosi(#[from] CosiError),

    #[error("{0} is not part of the round's view")]
    NotInView(NodeId),

    #[error("{0} is not a child of this node in the round's view")]
    UnknownChild(NodeId),

    #[error("commitment from {0} arrived after the commit phase closed")]
    LateCommitment(NodeId),

    #[error("response from {0} arrived after the response phase closed")]
    LateResponse(NodeId),

    #[error("response from {0} which never committed")]
    UncommittedResponse(NodeId),

    #[error("operation requires phase {expected:?} but round is in {actual:?}")]
    WrongPhase {
        expected: crate::round::RoundPhase,
        actual: crate::round::RoundPhase,
    },

    #[error("only the root of the view can do this")]
    NotRoot,

    #[error("the root cannot do this")]
    IsRoot,
}

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("link to {0} is closed")]
    Closed(NodeId),

    #[error("could not encode message: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown round kind {0:?}")]
    UnknownRoundKind(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal failures of the round-lifecycle driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} is not a member of the roster")]
    NotAMember(NodeId),

    #[error("view change failed after {attempts} attempts")]
    ViewChangeExhausted { attempts: u32 },

    #[error("driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
