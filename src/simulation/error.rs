//! Error taxonomy for the simulation core
//!
//! Every component boundary returns [`SimResult`]; nothing inside a tick is
//! allowed to abort it.

use serde::Serialize;
use thiserror::Error;

use super::types::{EdgeId, IncidentId, NodeId, VehicleId};

/// Coarse reason code surfaced to external callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NotFound,
    NoPathExists,
    InvalidArgument,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("no traffic light at node {0}")]
    LightNotFound(NodeId),

    #[error("vehicle {0:?} not found")]
    VehicleNotFound(VehicleId),

    #[error("incident {0:?} not found")]
    IncidentNotFound(IncidentId),

    /// The graph has nothing to target (no edges, or too few nodes)
    #[error("no target: {0}")]
    NoTarget(&'static str),

    #[error("no path from {from} to {to}")]
    NoPathExists { from: NodeId, to: NodeId },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SimError {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            SimError::NodeNotFound(_)
            | SimError::EdgeNotFound(_)
            | SimError::LightNotFound(_)
            | SimError::VehicleNotFound(_)
            | SimError::IncidentNotFound(_)
            | SimError::NoTarget(_) => ReasonCode::NotFound,
            SimError::NoPathExists { .. } => ReasonCode::NoPathExists,
            SimError::InvalidArgument(_) => ReasonCode::InvalidArgument,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
