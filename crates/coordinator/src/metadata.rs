//! Statements executed against the metadata store and parsers of the rows
//! they produce.
//!
//! The metadata store is a MySQL-compatible group-replicated database. Table
//! layout:
//!
//! - `meta_db_nodes(id, hostaddr, port, user_name, passwd)`
//! - `db_clusters(id, name, ha_mode)`
//! - `shards(id, name, db_cluster_id, num_tablets, space_volumn)`
//! - `shard_nodes(id, shard_id, db_cluster_id, hostaddr, port, user_name,
//!   passwd, member_state, status)`
//! - `comp_nodes(id, name, db_cluster_id, hostaddr, port, user_name, passwd,
//!   status)`
//! - `server_nodes(hostaddr, rack_id, total_mem, total_cpu_cores)`
//! - `cluster_backups(cluster_name, backup_storage, when_created, shards,
//!   shard_nodes, comps, ha_mode)`

use {
    admin_api::BackupInfo,
    domain::{
        machine::InstanceUsage,
        roster::{ClusterRecord, ComputerRecord, ShardRecord, StorageNodeRecord},
        ClusterId,
        HaMode,
        Machine,
        Node,
        NodeId,
        NodeKind,
        ShardId,
    },
    node_api::{variable::quote, Credentials, Endpoint, NodeAddr, Row},
    std::str::FromStr,
};

/// Online primaries of the metadata shard replication group.
pub const PRIMARY_MEMBERS: &str = "SELECT MEMBER_HOST, MEMBER_PORT FROM \
                                   performance_schema.replication_group_members WHERE \
                                   MEMBER_ROLE = 'PRIMARY' AND MEMBER_STATE = 'ONLINE'";

pub const META_NODE_COUNT: &str = "SELECT COUNT(*) FROM meta_db_nodes";

pub const META_NODES: &str =
    "SELECT id, hostaddr, port, user_name, passwd FROM meta_db_nodes ORDER BY id";

pub const CLUSTERS: &str = "SELECT id, name, ha_mode FROM db_clusters ORDER BY id";

pub const SHARDS: &str = "SELECT id, db_cluster_id, name FROM shards ORDER BY id";

pub const SHARD_NODES: &str = "SELECT id, db_cluster_id, shard_id, hostaddr, port, user_name, \
                               passwd, member_state FROM shard_nodes ORDER BY id";

pub const COMP_NODES: &str = "SELECT id, db_cluster_id, name, hostaddr, port, user_name, passwd \
                              FROM comp_nodes ORDER BY id";

pub const MACHINES: &str =
    "SELECT hostaddr, rack_id, total_mem, total_cpu_cores FROM server_nodes ORDER BY hostaddr";

pub const MAX_CLUSTER_ID: &str = "SELECT MAX(id) FROM db_clusters";

pub const MAX_SHARD_NODE_ID: &str = "SELECT MAX(id) FROM shard_nodes";

pub const MAX_COMPUTER_ID: &str = "SELECT MAX(id) FROM comp_nodes";

/// Per-table row counts and sizes, executed on storage nodes.
pub const TABLE_STATS: &str = "SELECT table_schema, table_name, table_rows, data_length FROM \
                               information_schema.tables WHERE table_schema NOT IN ('mysql', \
                               'information_schema', 'performance_schema', 'sys')";

/// Number of tables and bytes used, executed on storage nodes.
pub const SHARD_USAGE: &str = "SELECT COUNT(*), SUM(data_length + index_length) FROM \
                               information_schema.tables WHERE table_schema NOT IN ('mysql', \
                               'information_schema', 'performance_schema', 'sys')";

/// Oldest commit log position still required by a consumer, executed on
/// storage nodes.
pub const COMMIT_LOG_POSITION: &str = "SELECT MIN(position) FROM commit_log_consumers";

/// Size of a storage engine page, used to derive page counts from table
/// sizes.
pub const PAGE_SIZE: u64 = 16 * 1024;

/// Status of shard nodes added through the coordinator, until the node
/// agent reports otherwise.
const NEW_NODE_STATUS: &str = "creating";

/// Status of metadata rows identifying a replica.
const REPLICA_MEMBER_STATE: &str = "replica";

/// `member_state` of the primary of a shard.
const PRIMARY_MEMBER_STATE: &str = "source";

/// Statements deleting a cluster with everything it owns, in execution order.
pub fn delete_cluster(cluster: &str) -> [String; 4] {
    let ids = cluster_ids(cluster);
    [
        format!("DELETE FROM shard_nodes WHERE db_cluster_id IN ({ids})"),
        format!("DELETE FROM comp_nodes WHERE db_cluster_id IN ({ids})"),
        format!("DELETE FROM shards WHERE db_cluster_id IN ({ids})"),
        format!("DELETE FROM db_clusters WHERE name = {}", quote(cluster)),
    ]
}

/// Statements deleting a shard with its nodes, in execution order.
pub fn delete_shard(cluster: &str, shard: &str) -> [String; 2] {
    [
        format!(
            "DELETE FROM shard_nodes WHERE shard_id IN ({})",
            shard_ids(cluster, shard)
        ),
        format!(
            "DELETE FROM shards WHERE name = {} AND db_cluster_id IN ({})",
            quote(shard),
            cluster_ids(cluster)
        ),
    ]
}

pub fn delete_shard_node(cluster: &str, shard: &str, addr: &NodeAddr) -> String {
    format!(
        "DELETE FROM shard_nodes WHERE hostaddr = {} AND port = {} AND shard_id IN ({})",
        quote(&addr.host),
        addr.port,
        shard_ids(cluster, shard)
    )
}

pub fn delete_computer(cluster: &str, name: &str) -> String {
    format!(
        "DELETE FROM comp_nodes WHERE name = {} AND db_cluster_id IN ({})",
        quote(name),
        cluster_ids(cluster)
    )
}

pub fn insert_shard_node(cluster_id: ClusterId, shard_id: ShardId, node: &Node) -> String {
    let addr = node.addr();
    let creds = node.credentials();
    format!(
        "INSERT INTO shard_nodes (id, shard_id, db_cluster_id, hostaddr, port, user_name, passwd, \
         member_state, status) VALUES ({}, {shard_id}, {cluster_id}, {}, {}, {}, {}, {}, {})",
        node.id(),
        quote(&addr.host),
        addr.port,
        quote(&creds.user),
        quote(&creds.password),
        quote(REPLICA_MEMBER_STATE),
        quote(NEW_NODE_STATUS),
    )
}

/// Builds a statement updating the status of a storage node or computer.
/// Returns [`None`] for [`NodeKind::Meta`].
pub fn update_instance_status(kind: NodeKind, addr: &NodeAddr, status: &str) -> Option<String> {
    let table = match kind {
        NodeKind::Storage => "shard_nodes",
        NodeKind::Computer => "comp_nodes",
        NodeKind::Meta => return None,
    };

    Some(format!(
        "UPDATE {table} SET status = {} WHERE hostaddr = {} AND port = {}",
        quote(status),
        quote(&addr.host),
        addr.port
    ))
}

pub fn has_machine(hostaddr: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM server_nodes WHERE hostaddr = {}",
        quote(hostaddr)
    )
}

/// Statements returning `(count, max port)` of the instances placed on a
/// host: meta nodes, storage nodes and computers.
pub fn machine_usage(hostaddr: &str) -> [String; 3] {
    let host = quote(hostaddr);
    ["meta_db_nodes", "shard_nodes", "comp_nodes"]
        .map(|table| format!("SELECT COUNT(*), MAX(port) FROM {table} WHERE hostaddr = {host}"))
}

/// Latest backup of `cluster` taken at or before `timestamp`.
pub fn backup_info(cluster: &str, timestamp: &str) -> String {
    format!(
        "SELECT cluster_name, backup_storage, when_created, shards, shard_nodes, comps, ha_mode \
         FROM cluster_backups WHERE cluster_name = {} AND when_created <= {} ORDER BY \
         when_created DESC LIMIT 1",
        quote(cluster),
        quote(timestamp)
    )
}

/// Records the identity of a shard on its primary.
pub fn write_cluster_info(cluster: &str, shard: &str) -> String {
    format!(
        "REPLACE INTO cluster_info (cluster_name, shard_name) VALUES ({}, {})",
        quote(cluster),
        quote(shard)
    )
}

/// Pushes the statistics of a storage table to a computer.
pub fn update_table_stats(stats: &TableStats) -> String {
    format!(
        "UPDATE pg_class SET reltuples = {}, relpages = {} WHERE relname = {} AND relnamespace = \
         (SELECT oid FROM pg_namespace WHERE nspname = {})",
        stats.rows,
        stats.pages(),
        quote(&stats.table),
        quote(&stats.schema)
    )
}

/// Pushes the usage of a shard to a computer.
pub fn update_computer_shard_usage(shard_id: ShardId, usage: ShardUsage) -> String {
    format!(
        "UPDATE pg_shard SET num_tablets = {}, space_volumn = {} WHERE id = {shard_id}",
        usage.tablets, usage.bytes
    )
}

/// Records the usage of a shard in the metadata store.
pub fn update_meta_shard_usage(shard_id: ShardId, usage: ShardUsage) -> String {
    format!(
        "UPDATE shards SET num_tablets = {}, space_volumn = {} WHERE id = {shard_id}",
        usage.tablets, usage.bytes
    )
}

pub fn truncate_commit_log(watermark: u64) -> String {
    format!("CALL truncate_commit_log({watermark})")
}

fn cluster_ids(cluster: &str) -> String {
    format!("SELECT id FROM db_clusters WHERE name = {}", quote(cluster))
}

fn shard_ids(cluster: &str, shard: &str) -> String {
    format!(
        "SELECT s.id FROM shards s JOIN db_clusters c ON s.db_cluster_id = c.id WHERE c.name = {} \
         AND s.name = {}",
        quote(cluster),
        quote(shard)
    )
}

/// Row produced by the metadata store doesn't have the expected shape.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    #[error("Column {0} is missing or NULL")]
    Missing(usize),

    #[error("Column {column} has invalid value {value:?}")]
    Invalid { column: usize, value: String },
}

pub fn parse_backup_info(row: &Row) -> Result<BackupInfo, RowError> {
    let ha_mode = match opt_cell(row, 6) {
        Some(_) => parse::<HaMode>(row, 6)?,
        None => HaMode::default(),
    };

    Ok(BackupInfo {
        cluster_name: cell(row, 0)?.to_owned(),
        storage: cell(row, 1)?.to_owned(),
        taken_at: cell(row, 2)?.to_owned(),
        shards: parse(row, 3)?,
        shard_nodes: parse(row, 4)?,
        comps: parse_or_default(row, 5)?,
        ha_mode,
    })
}

/// Statistics of a single storage table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableStats {
    pub schema: String,
    pub table: String,
    pub rows: u64,
    pub bytes: u64,
}

impl TableStats {
    pub fn pages(&self) -> u64 {
        self.bytes.div_ceil(PAGE_SIZE)
    }
}

/// Number of tables stored by a shard and the space they occupy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardUsage {
    pub tablets: u64,
    pub bytes: u64,
}

fn opt_cell(row: &Row, column: usize) -> Option<&str> {
    row.get(column).and_then(Option::as_deref)
}

fn cell(row: &Row, column: usize) -> Result<&str, RowError> {
    opt_cell(row, column).ok_or(RowError::Missing(column))
}

fn parse<T: FromStr>(row: &Row, column: usize) -> Result<T, RowError> {
    let value = cell(row, column)?;
    value.parse().map_err(|_| RowError::Invalid {
        column,
        value: value.to_owned(),
    })
}

/// Parses a column which is `NULL` for aggregates over no rows.
fn parse_or_default<T: FromStr + Default>(row: &Row, column: usize) -> Result<T, RowError> {
    match opt_cell(row, column) {
        Some(_) => parse(row, column),
        None => Ok(T::default()),
    }
}

fn endpoint(row: &Row, first_column: usize) -> Result<Endpoint, RowError> {
    let addr = NodeAddr::new(cell(row, first_column)?, parse(row, first_column + 1)?);
    let credentials = Credentials::new(cell(row, first_column + 2)?, cell(row, first_column + 3)?);
    Ok(Endpoint::new(addr, credentials))
}

/// Returns the first cell of the first row, if any.
pub fn scalar(rows: &[Row]) -> Option<&str> {
    rows.first().and_then(|row| opt_cell(row, 0))
}

/// Parses the first cell of the first row, treating `NULL` and no rows as
/// [`None`].
pub fn parse_scalar<T: FromStr>(rows: &[Row]) -> Result<Option<T>, RowError> {
    match rows.first() {
        Some(row) if opt_cell(row, 0).is_some() => parse(row, 0).map(Some),
        _ => Ok(None),
    }
}

pub fn parse_member(row: &Row) -> Result<NodeAddr, RowError> {
    Ok(NodeAddr::new(cell(row, 0)?, parse(row, 1)?))
}

pub fn parse_meta_node(row: &Row) -> Result<Node, RowError> {
    Ok(Node::new(parse(row, 0)?, NodeKind::Meta, endpoint(row, 1)?))
}

pub fn parse_cluster(row: &Row) -> Result<ClusterRecord, RowError> {
    let ha_mode = match opt_cell(row, 2) {
        Some(_) => parse::<HaMode>(row, 2)?,
        None => HaMode::default(),
    };

    Ok(ClusterRecord {
        id: parse(row, 0)?,
        name: cell(row, 1)?.to_owned(),
        ha_mode,
    })
}

pub fn parse_shard(row: &Row) -> Result<ShardRecord, RowError> {
    Ok(ShardRecord {
        id: parse(row, 0)?,
        cluster_id: parse(row, 1)?,
        name: cell(row, 2)?.to_owned(),
    })
}

pub fn parse_storage_node(row: &Row) -> Result<StorageNodeRecord, RowError> {
    Ok(StorageNodeRecord {
        id: parse(row, 0)?,
        cluster_id: parse(row, 1)?,
        shard_id: parse(row, 2)?,
        endpoint: endpoint(row, 3)?,
        is_primary: opt_cell(row, 7) == Some(PRIMARY_MEMBER_STATE),
    })
}

pub fn parse_computer(row: &Row) -> Result<ComputerRecord, RowError> {
    Ok(ComputerRecord {
        id: parse(row, 0)?,
        cluster_id: parse(row, 1)?,
        name: cell(row, 2)?.to_owned(),
        endpoint: endpoint(row, 3)?,
    })
}

pub fn parse_machine(row: &Row) -> Result<Machine, RowError> {
    Ok(Machine {
        rack_id: opt_cell(row, 1).map(ToOwned::to_owned),
        total_mem: parse_or_default(row, 2)?,
        total_cpu_cores: parse_or_default(row, 3)?,
        ..Machine::new(cell(row, 0)?)
    })
}

/// Parses a `(count, max port)` row of [`machine_usage`].
pub fn parse_usage(row: &Row) -> Result<(u32, u16), RowError> {
    Ok((parse(row, 0)?, parse_or_default(row, 1)?))
}

/// Combines the rows of the [`machine_usage`] statements.
pub fn instance_usage(
    meta: (u32, u16),
    storage: (u32, u16),
    compute: (u32, u16),
) -> InstanceUsage {
    InstanceUsage {
        storage_instances: meta.0 + storage.0,
        compute_instances: compute.0,
        max_storage_port: meta.1.max(storage.1),
        max_compute_port: compute.1,
    }
}

pub fn parse_table_stats(row: &Row) -> Result<TableStats, RowError> {
    Ok(TableStats {
        schema: cell(row, 0)?.to_owned(),
        table: cell(row, 1)?.to_owned(),
        rows: parse_or_default(row, 2)?,
        bytes: parse_or_default(row, 3)?,
    })
}

pub fn parse_shard_usage(row: &Row) -> Result<ShardUsage, RowError> {
    Ok(ShardUsage {
        tablets: parse_or_default(row, 0)?,
        bytes: parse_or_default(row, 1)?,
    })
}

/// Id following the largest one in a `MAX(id)` result.
pub fn next_id(rows: &[Row]) -> Result<NodeId, RowError> {
    Ok(parse_scalar::<NodeId>(rows)?.unwrap_or_default() + 1)
}
