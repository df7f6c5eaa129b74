//! Control requests served by the coordinator.
//!
//! Every [`Request`] variant maps to exactly one coordinator operation.

use {
    domain::{HaMode, NodeKind},
    node_api::VariableValue,
    serde::{Deserialize, Serialize},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Lists the nodes of the metadata shard.
    ListMetaNodes,

    /// Lists every cluster together with its shard and computer counts.
    ListClusters,

    /// Lists the storage nodes of a cluster.
    ListStorageNodes { cluster_name: String },

    /// Lists the computers of a cluster.
    ListComputers { cluster_name: String },

    /// Lists the instances of every kind (or of the provided one), placed on
    /// any of the provided hosts. An empty host list matches every host.
    ListInstances {
        #[serde(default)]
        kind: Option<NodeKind>,
        #[serde(default)]
        hosts: Vec<String>,
    },

    GetVariable {
        ip: String,
        port: u16,
        variable: String,
    },

    SetVariable {
        ip: String,
        port: u16,
        variable: String,
        value: VariableValue,
    },

    AddShardNodes {
        cluster_name: String,
        shard_name: String,
        nodes: Vec<NodeSpec>,
    },

    StopCluster { cluster_name: String },

    StopShard {
        cluster_name: String,
        shard_name: String,
    },

    StopShardNode {
        cluster_name: String,
        shard_name: String,
        ip: String,
        port: u16,
    },

    StopComputer {
        cluster_name: String,
        comp_name: String,
    },

    /// Looks up the latest backup of a cluster taken at or before
    /// `timestamp`, to restore it from.
    GetBackupInfo {
        backup_cluster_name: String,
        timestamp: String,
    },
}

/// Connection parameters of a node being added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Nodes(Vec<NodeInfo>),
    Clusters(Vec<ClusterSummary>),

    /// Outcome of a variable operation. `result` is `false` if the node
    /// wasn't found or the statement failed.
    Variable {
        result: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        value: Option<String>,
    },

    /// Outcome of a mutation.
    Status {
        result: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error: Option<String>,
    },

    Backup(BackupInfo),

    /// Requested cluster, shard, computer, node or backup doesn't exist.
    NotFound { entity: String },
}

impl Response {
    pub fn ok() -> Self {
        Self::Status {
            result: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Status {
            result: false,
            error: Some(error.to_string()),
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }
}

/// Connection info of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub name: String,
    pub shards: usize,
    pub comps: usize,
}

/// Backup of a cluster, with the shape a cluster restored from it needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub cluster_name: String,

    /// Location of the backup files.
    pub storage: String,

    pub taken_at: String,
    pub shards: u32,

    /// Number of nodes of every shard.
    pub shard_nodes: u32,

    pub comps: u32,
    pub ha_mode: HaMode,
}
