use {
    crate::{reconcile, Diff, HaMode, Node, NodeKind},
    node_api::{Endpoint, NodeAddr},
    std::mem,
};

/// Shard holding the metadata store.
///
/// Meta nodes are identified by their address: the bootstrap node is created
/// before its id is known. The bootstrap node is never removed, even if the
/// metadata store no longer lists it.
#[derive(Clone, Debug)]
pub struct MetaShard {
    ha_mode: HaMode,
    nodes: Vec<Node>,
    primary: Option<NodeAddr>,
    bootstrap: Endpoint,
}

/// Node selected to run a discovery round against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub endpoint: Endpoint,

    /// Whether the node was already known to be the primary.
    pub is_primary: bool,
}

impl MetaShard {
    pub fn new(bootstrap: Endpoint) -> Self {
        Self {
            ha_mode: HaMode::default(),
            nodes: Vec::new(),
            primary: None,
            bootstrap,
        }
    }

    pub fn ha_mode(&self) -> HaMode {
        self.ha_mode
    }

    pub fn set_ha_mode(&mut self, mode: HaMode) {
        self.ha_mode = mode;
    }

    pub fn bootstrap(&self) -> &Endpoint {
        &self.bootstrap
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, addr: &NodeAddr) -> Option<&Node> {
        self.nodes.iter().find(|n| n.addr() == addr)
    }

    pub fn node_mut(&mut self, addr: &NodeAddr) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.addr() == addr)
    }

    /// Returns the current primary [`Node`], if known.
    pub fn primary(&self) -> Option<&Node> {
        self.primary.as_ref().and_then(|addr| self.node(addr))
    }

    /// Marks the [`Node`] listening on `addr` as the primary.
    ///
    /// Returns `false` if there's no such node.
    pub fn set_primary(&mut self, addr: &NodeAddr) -> bool {
        if self.node(addr).is_none() {
            return false;
        }

        self.primary = Some(addr.clone());
        true
    }

    pub fn clear_primary(&mut self) {
        self.primary = None;
    }

    /// Picks the [`Node`] to start primary discovery from: the known primary,
    /// otherwise the bootstrap node.
    ///
    /// The bootstrap node may be unknown yet, see [`MetaShard::register_bootstrap`].
    pub fn contact(&self) -> Contact {
        match self.primary() {
            Some(primary) => Contact {
                endpoint: primary.endpoint().clone(),
                is_primary: true,
            },
            None => Contact {
                endpoint: self.bootstrap.clone(),
                is_primary: false,
            },
        }
    }

    /// Registers the bootstrap node (with id `0` until the metadata store tells
    /// otherwise) unless it's already known.
    pub fn register_bootstrap(&mut self) {
        let _ = self.register(Node::new(0, NodeKind::Meta, self.bootstrap.clone()));
    }

    /// Registers a [`Node`] unless one with the same address exists. Returns
    /// the endpoint of the registered (or existing) node.
    pub fn register(&mut self, node: Node) -> Endpoint {
        if let Some(existing) = self.node(node.addr()) {
            return existing.endpoint().clone();
        }

        let endpoint = node.endpoint().clone();
        self.nodes.push(node);
        endpoint
    }

    /// Registers a [`Node`], or replaces the id and endpoint of the one with
    /// the same address. Returns the endpoint of the stored node.
    pub fn upsert(&mut self, node: Node) -> Endpoint {
        let endpoint = node.endpoint().clone();
        match self.node_mut(node.addr()) {
            Some(existing) => existing.update_from(node),
            None => self.nodes.push(node),
        }
        endpoint
    }

    /// Reconciles the meta [`Node`]s against the roster stored in the
    /// metadata store, matching them by address.
    ///
    /// The bootstrap node and the primary are kept even if the roster doesn't
    /// list them.
    pub fn reconcile(&mut self, mut remote: Vec<Node>) -> Diff {
        let pinned = [Some(&self.bootstrap.addr), self.primary.as_ref()];
        for addr in pinned.into_iter().flatten() {
            if remote.iter().any(|n| n.addr() == addr) {
                continue;
            }

            if let Some(node) = self.node(addr) {
                remote.push(node.clone());
            }
        }

        reconcile::reconcile(&mut self.nodes, remote, |n| n.addr().clone())
    }

    /// Releases all [`Node`]s.
    pub fn clear(&mut self) -> Vec<Node> {
        self.primary = None;
        mem::take(&mut self.nodes)
    }
}
