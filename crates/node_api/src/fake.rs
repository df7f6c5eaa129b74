//! In-memory [`NodeConnection`] with scripted responses.

use {
    crate::{
        Credentials,
        Endpoint,
        Error,
        ErrorKind,
        NodeAddr,
        NodeConnection,
        Result,
        Row,
        TimeoutClass,
    },
    std::{
        collections::HashMap,
        sync::{Arc, Mutex, MutexGuard},
        time::Duration,
    },
};

const SHOW_VARIABLE_PREFIX: &str = "SHOW GLOBAL VARIABLES LIKE '";
const SET_VARIABLE_PREFIX: &str = "SET GLOBAL ";

/// Fake set of database nodes, addressable by [`NodeAddr`].
///
/// Unscripted statements succeed and return no rows.
#[derive(Clone, Default)]
pub struct Fake {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    latency: Option<Duration>,
    nodes: HashMap<NodeAddr, Node>,
}

#[derive(Default)]
struct Node {
    broken: bool,
    credentials: Option<Credentials>,
    exact: HashMap<String, Vec<Row>>,
    prefixed: Vec<(String, Vec<Row>)>,
    failing_prefixes: Vec<String>,
    variables: HashMap<String, String>,
    log: Vec<String>,
}

impl Fake {
    /// Makes every statement sleep for `latency` before completing.
    pub fn set_latency(&self, latency: Duration) {
        self.inner().latency = Some(latency);
    }

    /// Scripts the rows returned for an exact `query`.
    pub fn respond(&self, addr: &NodeAddr, query: impl Into<String>, rows: Vec<Row>) {
        self.with_node(addr, |node| {
            let _ = node.exact.insert(query.into(), rows);
        });
    }

    /// Scripts the rows returned for any statement starting with `prefix`.
    /// Later scripts take precedence.
    pub fn respond_prefix(&self, addr: &NodeAddr, prefix: impl Into<String>, rows: Vec<Row>) {
        self.with_node(addr, |node| node.prefixed.push((prefix.into(), rows)));
    }

    /// Makes statements starting with `prefix` fail with [`ErrorKind::Query`].
    pub fn fail_prefix(&self, addr: &NodeAddr, prefix: impl Into<String>) {
        self.with_node(addr, |node| node.failing_prefixes.push(prefix.into()));
    }

    /// Requires the provided [`Credentials`] for every statement on the node.
    pub fn require_credentials(&self, addr: &NodeAddr, credentials: Credentials) {
        self.with_node(addr, |node| node.credentials = Some(credentials));
    }

    /// Makes the node unreachable.
    pub fn break_(&self, addr: &NodeAddr) {
        self.with_node(addr, |node| node.broken = true);
    }

    /// Makes the node reachable again.
    pub fn repair(&self, addr: &NodeAddr) {
        self.with_node(addr, |node| node.broken = false);
    }

    pub fn set_variable(&self, addr: &NodeAddr, name: &str, value: impl Into<String>) {
        self.with_node(addr, |node| {
            let _ = node.variables.insert(name.to_owned(), value.into());
        });
    }

    pub fn variable(&self, addr: &NodeAddr, name: &str) -> Option<String> {
        self.inner()
            .nodes
            .get(addr)
            .and_then(|node| node.variables.get(name).cloned())
    }

    /// Returns every statement attempted on the node, in order.
    pub fn executed(&self, addr: &NodeAddr) -> Vec<String> {
        self.inner()
            .nodes
            .get(addr)
            .map(|node| node.log.clone())
            .unwrap_or_default()
    }

    /// Forgets the statement log of every node.
    pub fn clear_logs(&self) {
        for node in self.inner().nodes.values_mut() {
            node.log.clear();
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // A panicking test must not cascade into unrelated ones.
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn with_node<R>(&self, addr: &NodeAddr, f: impl FnOnce(&mut Node) -> R) -> R {
        f(self.inner().nodes.entry(addr.clone()).or_default())
    }
}

impl Node {
    fn execute(&mut self, endpoint: &Endpoint, query: &str) -> Result<Vec<Row>> {
        let addr = &endpoint.addr;
        self.log.push(query.to_owned());

        if self.broken {
            return Err(Error::new(ErrorKind::Connection, addr.clone(), "node is down"));
        }

        if let Some(creds) = &self.credentials {
            if creds != &endpoint.credentials {
                return Err(Error::new(ErrorKind::Auth, addr.clone(), "access denied"));
            }
        }

        if self.failing_prefixes.iter().any(|p| query.starts_with(p)) {
            return Err(Error::new(ErrorKind::Query, addr.clone(), "statement failed"));
        }

        if let Some(name) = query
            .strip_prefix(SHOW_VARIABLE_PREFIX)
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Ok(self
                .variables
                .get(name)
                .map(|value| vec![vec![Some(name.to_owned()), Some(value.clone())]])
                .unwrap_or_default());
        }

        if let Some((name, literal)) = query
            .strip_prefix(SET_VARIABLE_PREFIX)
            .and_then(|rest| rest.split_once(" = "))
        {
            let _ = self.variables.insert(name.to_owned(), unquote(literal));
            return Ok(vec![]);
        }

        if let Some(rows) = self.exact.get(query) {
            return Ok(rows.clone());
        }

        Ok(self
            .prefixed
            .iter()
            .rev()
            .find(|(prefix, _)| query.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

impl NodeConnection for Fake {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        query: &str,
        _timeout: TimeoutClass,
    ) -> Result<Vec<Row>> {
        let latency = self.inner().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.with_node(&endpoint.addr, |node| node.execute(endpoint, query))
    }
}

fn unquote(literal: &str) -> String {
    match literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        Some(s) => s.replace("''", "'").replace("\\\\", "\\"),
        None => literal.to_owned(),
    }
}

/// Shorthand for building a [`Row`] from string literals.
pub fn row<const N: usize>(cells: [&str; N]) -> Row {
    cells.into_iter().map(|c| Some(c.to_owned())).collect()
}
