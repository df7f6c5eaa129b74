use {
    crate::{name, reconcile, ClusterId, Diff, HaMode, Node, NodeId, Shard, ShardId},
    std::mem,
};

/// Named set of storage [`Shard`]s and computer [`Node`]s.
///
/// Names of shards, as well as names of computers, are unique within a
/// cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    id: ClusterId,
    name: String,
    ha_mode: HaMode,
    shards: Vec<Shard>,
    computers: Vec<Node>,
}

/// Remote state of a [`Shard`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteShard {
    pub id: ShardId,
    pub name: String,
    pub nodes: Vec<Node>,
    pub primary: Option<NodeId>,
}

/// Entity with the same name already exists in the [`Cluster`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Duplicate name: {0}")]
pub struct DuplicateNameError(pub String);

impl Cluster {
    pub fn new(id: ClusterId, name: impl Into<String>, ha_mode: HaMode) -> Self {
        Self {
            id,
            name: name.into(),
            ha_mode,
            shards: Vec::new(),
            computers: Vec::new(),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Returns the [`HaMode`] new shards of this [`Cluster`] are created
    /// with.
    pub fn ha_mode(&self) -> HaMode {
        self.ha_mode
    }

    pub(crate) fn set_ha_mode(&mut self, mode: HaMode) {
        self.ha_mode = mode;
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn shards_mut(&mut self) -> &mut [Shard] {
        &mut self.shards
    }

    pub fn shard(&self, name: &str) -> Option<&Shard> {
        self.shards.iter().find(|s| s.name() == name)
    }

    pub fn shard_mut(&mut self, name: &str) -> Option<&mut Shard> {
        self.shards.iter_mut().find(|s| s.name() == name)
    }

    /// Returns the [`Shard`]s of this [`Cluster`] ordered by [`ShardId`].
    pub fn shards_by_id(&self) -> Vec<&Shard> {
        let mut shards: Vec<_> = self.shards.iter().collect();
        shards.sort_by_key(|s| s.id());
        shards
    }

    /// Returns the position of the named [`Shard`] in [`Cluster::shards_by_id`].
    pub fn shard_order(&self, name: &str) -> Option<usize> {
        self.shards_by_id().iter().position(|s| s.name() == name)
    }

    pub fn add_shard(&mut self, shard: Shard) -> Result<(), DuplicateNameError> {
        if self
            .shards
            .iter()
            .any(|s| s.id() == shard.id() || s.name() == shard.name())
        {
            return Err(DuplicateNameError(shard.name().to_owned()));
        }

        self.shards.push(shard);
        Ok(())
    }

    pub fn remove_shard(&mut self, name: &str) -> Option<Shard> {
        let idx = self.shards.iter().position(|s| s.name() == name)?;
        Some(self.shards.remove(idx))
    }

    pub fn computers(&self) -> &[Node] {
        &self.computers
    }

    pub fn computer(&self, name: &str) -> Option<&Node> {
        self.computers.iter().find(|c| c.name() == Some(name))
    }

    pub fn computer_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.computers.iter_mut().find(|c| c.name() == Some(name))
    }

    pub(crate) fn computers_mut(&mut self) -> &mut [Node] {
        &mut self.computers
    }

    pub fn add_computer(&mut self, node: Node) -> Result<(), DuplicateNameError> {
        if self
            .computers
            .iter()
            .any(|c| c.id() == node.id() || c.name() == node.name())
        {
            return Err(DuplicateNameError(node.name().unwrap_or_default().to_owned()));
        }

        self.computers.push(node);
        Ok(())
    }

    pub fn remove_computer(&mut self, name: &str) -> Option<Node> {
        let idx = self.computers.iter().position(|c| c.name() == Some(name))?;
        Some(self.computers.remove(idx))
    }

    /// Iterates over all storage [`Node`]s of this [`Cluster`].
    pub fn storage_nodes(&self) -> impl Iterator<Item = (&Shard, &Node)> + '_ {
        self.shards
            .iter()
            .flat_map(|s| s.nodes().iter().map(move |n| (s, n)))
    }

    pub fn max_storage_node_id(&self) -> Option<NodeId> {
        self.shards.iter().filter_map(Shard::max_node_id).max()
    }

    /// Returns the largest numeric suffix among the shard names.
    pub fn max_shard_suffix(&self) -> u64 {
        name::max_suffix(self.shards.iter().map(Shard::name))
    }

    /// Returns the largest numeric suffix among the computer names.
    pub fn max_computer_suffix(&self) -> u64 {
        name::max_suffix(self.computers.iter().filter_map(Node::name))
    }

    /// Reconciles the [`Shard`]s and their storage [`Node`]s against the
    /// remote state, matching shards and nodes by id.
    ///
    /// Shards missing remotely are dropped together with their nodes. Remote
    /// shards reusing a name of another shard are ignored.
    pub fn reconcile_shards(&mut self, remote: Vec<RemoteShard>) -> Diff {
        let mut diff = Diff::default();

        self.shards.retain_mut(|shard| {
            if remote.iter().any(|r| r.id == shard.id()) {
                return true;
            }

            diff.removed.extend(shard.take_nodes());
            false
        });

        let mut seen: Vec<&str> = Vec::with_capacity(remote.len());
        let remote: Vec<_> = remote
            .iter()
            .filter(|r| {
                if seen.contains(&r.name.as_str()) {
                    tracing::warn!(cluster = %self.name, shard = %r.name, "Duplicate shard name");
                    return false;
                }

                seen.push(&r.name);
                true
            })
            .cloned()
            .collect();

        for remote in remote {
            let ha_mode = self.ha_mode;
            let shard = match self.shards.iter().position(|s| s.id() == remote.id) {
                Some(idx) => &mut self.shards[idx],
                None => {
                    self.shards.push(Shard::new(remote.id, remote.name.clone(), ha_mode));
                    let idx = self.shards.len() - 1;
                    &mut self.shards[idx]
                }
            };

            if shard.name() != remote.name {
                shard.set_name(remote.name);
            }
            shard.set_ha_mode(ha_mode);

            diff.merge(shard.reconcile(remote.nodes, remote.primary));
        }

        diff
    }

    /// Reconciles the computer [`Node`]s against the remote state, matching
    /// them by [`NodeId`].
    pub fn reconcile_computers(&mut self, remote: Vec<Node>) -> Diff {
        let mut names: Vec<String> = Vec::with_capacity(remote.len());
        let remote = remote
            .into_iter()
            .filter(|c| {
                let name = c.name().unwrap_or_default();
                if names.iter().any(|n| n == name) {
                    tracing::warn!(cluster = %self.name, computer = %name, "Duplicate computer name");
                    return false;
                }

                names.push(name.to_owned());
                true
            })
            .collect();

        reconcile::reconcile(&mut self.computers, remote, Node::id)
    }

    /// Releases all [`Shard`]s and computers of this [`Cluster`], returning
    /// the released [`Node`]s.
    pub fn release(&mut self) -> Vec<Node> {
        let mut nodes = mem::take(&mut self.computers);
        for mut shard in mem::take(&mut self.shards) {
            nodes.extend(shard.take_nodes());
        }
        nodes
    }
}
