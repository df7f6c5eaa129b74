use {
    crate::metadata::RowError,
    domain::{machine::PortsExhaustedError, NodeKind},
    node_api::{variable::InvalidNameError, NodeAddr},
};

/// Error of a [`Coordinator`](crate::Coordinator) operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Node(#[from] node_api::Error),

    #[error("Metadata shard primary is not known")]
    MetaPrimaryUnknown,

    #[error("Shard {shard} of cluster {cluster} has no primary")]
    PrimaryNotAvailable { cluster: String, shard: String },

    /// The in-memory topology was changed, but the metadata store wasn't.
    #[error("Failed to persist {op}: {source}")]
    Persistence {
        op: &'static str,
        source: node_api::Error,
    },

    #[error(transparent)]
    MalformedRow(#[from] RowError),

    #[error(transparent)]
    InvalidVariable(#[from] InvalidNameError),

    #[error("Variable {0} is not defined on the node")]
    UnknownVariable(String),

    #[error("Node {0} is already a member of the shard")]
    DuplicateNode(NodeAddr),

    #[error("{0} nodes have no status")]
    NoStatus(NodeKind),

    #[error(transparent)]
    PortsExhausted(#[from] PortsExhaustedError),
}

/// Error of a metadata shard primary discovery round.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// More than one node claims to be the primary. Requires an operator.
    #[error("Multiple metadata shard primaries: {0:?}")]
    MultiplePrimaries(Vec<NodeAddr>),

    #[error(transparent)]
    Node(#[from] node_api::Error),

    #[error(transparent)]
    MalformedRow(#[from] RowError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
