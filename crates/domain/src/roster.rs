//! Authoritative topology description, as read from the metadata store.

use {
    crate::{ClusterId, HaMode, Node, NodeId, NodeKind, ShardId},
    node_api::Endpoint,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub ha_mode: HaMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardRecord {
    pub id: ShardId,
    pub cluster_id: ClusterId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageNodeRecord {
    pub id: NodeId,
    pub cluster_id: ClusterId,
    pub shard_id: ShardId,
    pub endpoint: Endpoint,
    pub is_primary: bool,
}

impl StorageNodeRecord {
    pub fn to_node(&self) -> Node {
        Node::new(self.id, NodeKind::Storage, self.endpoint.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputerRecord {
    pub id: NodeId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub endpoint: Endpoint,
}

impl ComputerRecord {
    pub fn to_node(&self) -> Node {
        Node::computer(self.id, self.name.clone(), self.endpoint.clone())
    }
}

/// Every cluster with its shards and their storage nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageRoster {
    pub clusters: Vec<ClusterRecord>,
    pub shards: Vec<ShardRecord>,
    pub nodes: Vec<StorageNodeRecord>,
}

/// Every cluster with its computers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputerRoster {
    pub clusters: Vec<ClusterRecord>,
    pub computers: Vec<ComputerRecord>,
}
