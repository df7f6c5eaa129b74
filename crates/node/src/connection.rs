use {
    node_api::{Endpoint, Error, ErrorKind, NodeAddr, NodeConnection, Result, Row, TimeoutClass},
    parking_lot::Mutex,
    std::{collections::HashMap, mem, sync::Arc, time::Duration},
    tokio_postgres::{error::SqlState, Client, NoTls, SimpleQueryMessage, SimpleQueryRow},
};

/// Durations of the [`TimeoutClass`]es.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub short: Duration,
    pub normal: Duration,
    pub long: Duration,
}

impl Timeouts {
    pub fn get(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Short => self.short,
            TimeoutClass::Normal => self.normal,
            TimeoutClass::Long => self.long,
        }
    }
}

/// [`NodeConnection`] speaking the PostgreSQL wire protocol.
///
/// Sessions are opened on first use and cached per [`Endpoint`], so a
/// credentials change opens a new session.
pub struct PgConnection {
    timeouts: Timeouts,
    sessions: Mutex<HashMap<Endpoint, Arc<Client>>>,
}

impl PgConnection {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Closes every cached session. Returns the number of closed sessions.
    pub fn close(&self) -> usize {
        let sessions = mem::take(&mut *self.sessions.lock());
        metrics::gauge!("cmgr_node_sessions").set(0.0);
        sessions.len()
    }

    async fn session(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Arc<Client>> {
        let cached = self
            .sessions
            .lock()
            .get(endpoint)
            .filter(|client| !client.is_closed())
            .cloned();

        if let Some(client) = cached {
            return Ok(client);
        }

        let addr = &endpoint.addr;
        let mut config = tokio_postgres::Config::new();
        let _ = config
            .host(&addr.host)
            .port(addr.port)
            .user(&endpoint.credentials.user)
            .password(&endpoint.credentials.password)
            .connect_timeout(timeout);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|err| node_error(addr, &err, ErrorKind::Connection))?;

        let addr_ = addr.clone();
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(?err, addr = %addr_, "Session closed");
            }
        });

        let client = Arc::new(client);
        let count = {
            let mut sessions = self.sessions.lock();
            let _ = sessions.insert(endpoint.clone(), client.clone());
            sessions.len()
        };
        metrics::gauge!("cmgr_node_sessions").set(count as f64);
        tracing::debug!(%addr, "Session opened");

        Ok(client)
    }

    fn evict(&self, endpoint: &Endpoint) {
        let _ = self.sessions.lock().remove(endpoint);
    }
}

impl NodeConnection for PgConnection {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        query: &str,
        timeout: TimeoutClass,
    ) -> Result<Vec<Row>> {
        let duration = self.timeouts.get(timeout);
        let addr = &endpoint.addr;

        let execute = async {
            let client = self.session(endpoint, duration).await?;
            client.simple_query(query).await.map_err(|err| {
                if client.is_closed() {
                    self.evict(endpoint);
                }
                node_error(addr, &err, ErrorKind::Query)
            })
        };

        let messages = tokio::time::timeout(duration, execute)
            .await
            .map_err(|_| {
                self.evict(endpoint);
                Error::new(
                    ErrorKind::Timeout,
                    addr.clone(),
                    format!("no response within {duration:?}"),
                )
            })??;

        Ok(messages
            .into_iter()
            .filter_map(|msg| match msg {
                SimpleQueryMessage::Row(row) => Some(cells(&row)),
                _ => None,
            })
            .collect())
    }
}

fn cells(row: &SimpleQueryRow) -> Row {
    (0..row.len())
        .map(|idx| row.get(idx).map(ToOwned::to_owned))
        .collect()
}

fn node_error(addr: &NodeAddr, err: &tokio_postgres::Error, kind: ErrorKind) -> Error {
    let kind = match err.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            ErrorKind::Auth
        }
        _ if err.is_closed() => ErrorKind::Connection,
        _ => kind,
    };

    Error::new(kind, addr.clone(), err)
}
