use {
    crate::{reconcile, Diff, Node, NodeId},
    derive_more::Display,
    node_api::NodeAddr,
    serde::{Deserialize, Serialize},
    std::{mem, str::FromStr},
};

/// Identifier of a [`Shard`]. Unique within the owning [`Cluster`].
///
/// [`Cluster`]: crate::Cluster
pub type ShardId = u64;

/// Replication strategy of a [`Shard`].
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaMode {
    /// Single node, no failover.
    #[display("no-replication")]
    NoReplication,

    /// Multi-node consensus group.
    #[default]
    #[display("group-replication")]
    GroupReplication,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid HA mode: {0}")]
pub struct InvalidHaModeError(String);

impl FromStr for HaMode {
    type Err = InvalidHaModeError;

    /// Accepts both the display form and the short form stored in the
    /// metadata tables.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "no-replication" | "no_rep" => Self::NoReplication,
            "group-replication" | "mgr" => Self::GroupReplication,
            _ => return Err(InvalidHaModeError(s.to_owned())),
        })
    }
}

/// Group of replicated storage [`Node`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    id: ShardId,
    name: String,
    ha_mode: HaMode,
    nodes: Vec<Node>,

    /// Always points to one of `nodes`.
    primary: Option<NodeId>,
}

impl Shard {
    pub fn new(id: ShardId, name: impl Into<String>, ha_mode: HaMode) -> Self {
        Self {
            id,
            name: name.into(),
            ha_mode,
            nodes: Vec::new(),
            primary: None,
        }
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn ha_mode(&self) -> HaMode {
        self.ha_mode
    }

    pub fn set_ha_mode(&mut self, mode: HaMode) {
        self.ha_mode = mode;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub fn node_by_addr(&self, addr: &NodeAddr) -> Option<&Node> {
        self.nodes.iter().find(|n| n.addr() == addr)
    }

    pub fn node_by_addr_mut(&mut self, addr: &NodeAddr) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.addr() == addr)
    }

    /// Returns the current primary [`Node`] of this [`Shard`], if known.
    pub fn primary(&self) -> Option<&Node> {
        self.primary.and_then(|id| self.node(id))
    }

    pub fn primary_id(&self) -> Option<NodeId> {
        self.primary
    }

    /// Marks the [`Node`] with the provided [`NodeId`] as the primary.
    ///
    /// Returns `false` if this [`Shard`] doesn't contain such node.
    pub fn set_primary(&mut self, id: NodeId) -> bool {
        if self.node(id).is_none() {
            return false;
        }

        self.primary = Some(id);
        true
    }

    pub fn clear_primary(&mut self) {
        self.primary = None;
    }

    /// Adds a [`Node`] to this [`Shard`].
    ///
    /// Returns `false` if a [`Node`] with the same [`NodeId`] already exists.
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.node(node.id()).is_some() {
            return false;
        }

        self.nodes.push(node);
        true
    }

    /// Removes a [`Node`] from this [`Shard`], invalidating the primary
    /// reference if it pointed to the removed node.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| n.id() == id)?;

        if self.primary == Some(id) {
            self.primary = None;
        }

        Some(self.nodes.remove(idx))
    }

    /// Removes the [`Node`] listening on the provided address.
    pub fn remove_node_by_addr(&mut self, addr: &NodeAddr) -> Option<Node> {
        let id = self.node_by_addr(addr)?.id();
        self.remove_node(id)
    }

    /// Returns the largest [`NodeId`] in this [`Shard`].
    pub fn max_node_id(&self) -> Option<NodeId> {
        self.nodes.iter().map(Node::id).max()
    }

    /// Reconciles the [`Node`]s of this [`Shard`] against the remote roster,
    /// matching them by [`NodeId`].
    ///
    /// If `primary` is provided it becomes the new primary, otherwise the
    /// current one is kept as long as it's still a member.
    pub fn reconcile(&mut self, remote: Vec<Node>, primary: Option<NodeId>) -> Diff {
        let diff = reconcile::reconcile(&mut self.nodes, remote, Node::id);

        if let Some(id) = self.primary {
            if diff.removed.iter().any(|n| n.id() == id) {
                self.primary = None;
            }
        }

        if let Some(id) = primary {
            let _ = self.set_primary(id);
        }

        diff
    }

    /// Returns one [`Node`] suitable for taking a backup from: the only node
    /// of a single-node shard, otherwise any node which isn't the primary.
    pub fn backup_node(&self) -> Option<&Node> {
        match self.nodes.as_slice() {
            [] => None,
            [single] => Some(single),
            nodes => nodes.iter().find(|n| Some(n.id()) != self.primary),
        }
    }

    /// Removes all [`Node`]s of this [`Shard`].
    pub(crate) fn take_nodes(&mut self) -> Vec<Node> {
        self.primary = None;
        mem::take(&mut self.nodes)
    }
}
