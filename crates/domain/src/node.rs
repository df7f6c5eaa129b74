use {
    derive_more::Display,
    node_api::{Credentials, Endpoint, ErrorKind, NodeAddr},
    serde::{Deserialize, Serialize},
};

/// Identifier of a [`Node`]. Unique within the owning [`Shard`] or
/// [`Cluster`].
///
/// [`Shard`]: crate::Shard
/// [`Cluster`]: crate::Cluster
pub type NodeId = u64;

/// Role of a [`Node`] within the topology.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[display("meta")]
    Meta,
    #[display("storage")]
    Storage,
    #[display("computer")]
    Computer,
}

/// Database node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    name: Option<String>,
    endpoint: Endpoint,
    session: Session,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, endpoint: Endpoint) -> Self {
        Self {
            id,
            kind,
            name: None,
            endpoint,
            session: Session::default(),
        }
    }

    /// Builds a named computer [`Node`].
    pub fn computer(id: NodeId, name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(id, NodeKind::Computer, endpoint)
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the name of this [`Node`]. Only computers are named.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn addr(&self) -> &NodeAddr {
        &self.endpoint.addr
    }

    pub fn credentials(&self) -> &Credentials {
        &self.endpoint.credentials
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Indicates whether this [`Node`] listens on the provided host and port.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.endpoint.addr.matches(host, port)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Indicates whether `other` describes this [`Node`] in the same state.
    /// [`Session`]s are not compared.
    pub fn same_state(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.name == other.name
            && self.endpoint == other.endpoint
    }

    /// Replaces the descriptive fields of this [`Node`] with the ones of
    /// `other`, keeping the [`Session`] unless the endpoint changed.
    pub(crate) fn update_from(&mut self, other: Self) {
        if self.endpoint != other.endpoint {
            self.session = Session::default();
        }

        self.id = other.id;
        self.name = other.name;
        self.endpoint = other.endpoint;
    }
}

/// Health of the connection to a [`Node`], as observed by the statements
/// executed on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    consecutive_failures: u32,
    last_error: Option<ErrorKind>,
}

impl Session {
    /// Records the outcome of a statement executed on the node.
    pub fn record<T>(&mut self, result: &node_api::Result<T>) {
        match result {
            Ok(_) => {
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_error = Some(err.kind);
            }
        }
    }

    /// Indicates whether the last statement executed on the node succeeded
    /// (or no statement was executed yet).
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }
}
