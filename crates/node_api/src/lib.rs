//! Connection-level contract between the coordinator and the database nodes
//! it manages.
//!
//! The coordinator never speaks a wire protocol itself. It hands an
//! [`Endpoint`] and a textual statement to a [`NodeConnection`] and gets back
//! rows of text cells.

use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::{fmt, future::Future, str::FromStr},
};

#[cfg(feature = "testing")]
pub mod fake;
pub mod variable;

pub use variable::VariableValue;

/// Network address of a database node.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[display("{host}:{port}")]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Indicates whether this [`NodeAddr`] points to the provided host and
    /// port.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host == host
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid node address: {0}")]
pub struct InvalidNodeAddr(String);

impl FromStr for NodeAddr {
    type Err = InvalidNodeAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidNodeAddr(s.to_owned()))?;

        if host.is_empty() {
            return Err(InvalidNodeAddr(s.to_owned()));
        }

        let port = port.parse().map_err(|_| InvalidNodeAddr(s.to_owned()))?;

        Ok(Self::new(host, port))
    }
}

/// Login credentials of a database node.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

// Passwords end up in logs otherwise.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Everything required to open a session with a database node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: NodeAddr,
    pub credentials: Credentials,
}

impl Endpoint {
    pub fn new(addr: NodeAddr, credentials: Credentials) -> Self {
        Self { addr, credentials }
    }
}

/// Single result row. Cells are in the text representation, `NULL`s are
/// [`None`].
pub type Row = Vec<Option<String>>;

/// Class of the timeout a [`NodeConnection`] should apply to a statement.
///
/// Concrete durations are chosen by the [`NodeConnection`] implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Cheap catalog lookups (membership views, variables).
    Short,

    /// Regular metadata reads and writes.
    Normal,

    /// Statistics pulls and maintenance statements.
    Long,
}

/// Executes statements against database nodes.
pub trait NodeConnection: Send + Sync + 'static {
    /// Executes `query` on the node identified by `endpoint` and returns the
    /// produced rows. Statements producing no result set return an empty
    /// [`Vec`].
    fn execute(
        &self,
        endpoint: &Endpoint,
        query: &str,
        timeout: TimeoutClass,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;
}

/// Kind of a [`NodeConnection`] [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Node is not reachable over the network.
    Connection,

    /// Node rejected the provided credentials.
    Auth,

    /// Node failed to execute the statement.
    Query,

    /// Statement didn't finish within its [`TimeoutClass`].
    Timeout,
}

/// [`NodeConnection`] error.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind:?} error on {addr}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub addr: NodeAddr,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, addr: NodeAddr, message: impl ToString) -> Self {
        Self {
            kind,
            addr,
            message: message.to_string(),
        }
    }
}

/// [`NodeConnection`] result.
pub type Result<T, E = Error> = std::result::Result<T, E>;
