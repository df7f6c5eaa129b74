use {
    admin_api::{Request, Response},
    cmgr_coordinator::{
        metadata,
        Config,
        Coordinator,
        DiscoveryError,
        Error,
        StatsReport,
        VariableOutcome,
    },
    domain::{HaMode, Node, NodeKind, PortFloors},
    node_api::{
        fake::{row, Fake},
        Credentials,
        Endpoint,
        ErrorKind,
        NodeAddr,
        Row,
        VariableValue,
    },
    std::{sync::Arc, time::Duration},
    test_log::test,
};

fn meta_addr(n: u8) -> NodeAddr {
    NodeAddr::new(format!("10.0.1.{n}"), 6001)
}

fn storage_addr(host: u8, port: u16) -> NodeAddr {
    NodeAddr::new(format!("10.0.0.{host}"), port)
}

fn meta_credentials() -> Credentials {
    Credentials::new("pgx", "pgx_pwd")
}

fn meta_row(id: u64, addr: &NodeAddr, creds: &Credentials) -> Row {
    row([
        &id.to_string(),
        &addr.host,
        &addr.port.to_string(),
        &creds.user,
        &creds.password,
    ])
}

fn member_row(addr: &NodeAddr) -> Row {
    row([&addr.host, &addr.port.to_string()])
}

fn cluster_row(id: u64, name: &str) -> Row {
    row([&id.to_string(), name, "mgr"])
}

fn shard_row(id: u64, cluster_id: u64, name: &str) -> Row {
    row([&id.to_string(), &cluster_id.to_string(), name])
}

fn node_row(id: u64, cluster_id: u64, shard_id: u64, addr: &NodeAddr, primary: bool) -> Row {
    row([
        &id.to_string(),
        &cluster_id.to_string(),
        &shard_id.to_string(),
        &addr.host,
        &addr.port.to_string(),
        "agent",
        "agent_pwd",
        if primary { "source" } else { "replica" },
    ])
}

fn computer_row(id: u64, cluster_id: u64, name: &str, addr: &NodeAddr) -> Row {
    row([
        &id.to_string(),
        &cluster_id.to_string(),
        name,
        &addr.host,
        &addr.port.to_string(),
        "abc",
        "abc_pwd",
    ])
}

fn null_row(cells: usize) -> Row {
    vec![None; cells]
}

struct StorageRoster {
    clusters: Vec<Row>,
    shards: Vec<Row>,
    nodes: Vec<Row>,
}

/// Two clusters:
/// - `cluster1` with `shard1` (nodes 1 and 2, primary 1) and `shard2` (node 3,
///   primary 3)
/// - `cluster2` with `shard1` (node 4, no primary)
fn storage_roster() -> StorageRoster {
    StorageRoster {
        clusters: vec![cluster_row(1, "cluster1"), cluster_row(2, "cluster2")],
        shards: vec![
            shard_row(1, 1, "shard1"),
            shard_row(2, 1, "shard2"),
            shard_row(3, 2, "shard1"),
        ],
        nodes: vec![
            node_row(1, 1, 1, &storage_addr(1, 3306), true),
            node_row(2, 1, 1, &storage_addr(1, 3307), false),
            node_row(3, 1, 2, &storage_addr(2, 3306), true),
            node_row(4, 2, 3, &storage_addr(3, 3306), false),
        ],
    }
}

struct Context {
    fake: Fake,
    coordinator: Arc<Coordinator<Fake>>,
}

impl Context {
    fn new(port_floors: PortFloors) -> Self {
        let fake = Fake::default();
        let config = Config {
            bootstrap: Endpoint::new(meta_addr(0), meta_credentials()),
            port_floors,
        };

        Self {
            coordinator: Arc::new(Coordinator::new(fake.clone(), config)),
            fake,
        }
    }

    /// Context with the bootstrap node being the only metadata shard primary.
    async fn bootstrapped() -> Self {
        let ctx = Self::new(PortFloors::default());
        ctx.primary_members(&meta_addr(0), &[meta_addr(0)]);
        ctx.fake.respond(&meta_addr(0), metadata::META_NODES, vec![meta_row(
            1,
            &meta_addr(0),
            &meta_credentials(),
        )]);

        assert_eq!(
            ctx.coordinator.discover_meta_primary().await.unwrap(),
            meta_addr(0)
        );
        ctx
    }

    /// Bootstrapped context with [`storage_roster`] and two computers of
    /// `cluster1` loaded.
    async fn populated() -> Self {
        let ctx = Self::bootstrapped().await;
        ctx.respond_storage(storage_roster());
        ctx.respond_computers(vec![
            computer_row(1, 1, "comp1", &storage_addr(9, 5432)),
            computer_row(2, 1, "comp2", &storage_addr(9, 5433)),
        ]);

        let _ = ctx.coordinator.refresh_shards().await.unwrap();
        let _ = ctx.coordinator.refresh_computers().await.unwrap();
        ctx
    }

    fn primary_members(&self, contact: &NodeAddr, primaries: &[NodeAddr]) {
        let rows = primaries.iter().map(member_row).collect();
        self.fake.respond(contact, metadata::PRIMARY_MEMBERS, rows);
    }

    fn respond_storage(&self, roster: StorageRoster) {
        let meta = meta_addr(0);
        self.fake.respond(&meta, metadata::CLUSTERS, roster.clusters);
        self.fake.respond(&meta, metadata::SHARDS, roster.shards);
        self.fake.respond(&meta, metadata::SHARD_NODES, roster.nodes);
    }

    fn respond_computers(&self, computers: Vec<Row>) {
        self.fake
            .respond(&meta_addr(0), metadata::COMP_NODES, computers);
    }
}

#[test(tokio::test)]
async fn discovery_assumes_isolated_contact_is_primary() {
    let ctx = Context::new(PortFloors::default());
    let bootstrap = meta_addr(0);
    ctx.fake
        .respond(&bootstrap, metadata::META_NODE_COUNT, vec![row(["1"])]);
    ctx.fake.respond(&bootstrap, metadata::META_NODES, vec![meta_row(
        7,
        &bootstrap,
        &meta_credentials(),
    )]);

    let primary = ctx.coordinator.discover_meta_primary().await.unwrap();

    assert_eq!(primary, bootstrap);
    assert_eq!(ctx.coordinator.meta_ha_mode().await, HaMode::NoReplication);
    assert_eq!(ctx.coordinator.meta_primary_addr().await, Some(bootstrap));

    let topology = ctx.coordinator.snapshot().await;
    let ids: Vec<_> = topology.meta().nodes().iter().map(Node::id).collect();
    assert_eq!(ids, vec![7]);
}

#[test(tokio::test)]
async fn discovery_keeps_replication_with_multiple_recorded_nodes() {
    let ctx = Context::new(PortFloors::default());
    ctx.fake
        .respond(&meta_addr(0), metadata::META_NODE_COUNT, vec![row(["3"])]);

    assert_eq!(
        ctx.coordinator.discover_meta_primary().await.unwrap(),
        meta_addr(0)
    );
    assert_eq!(
        ctx.coordinator.meta_ha_mode().await,
        HaMode::GroupReplication
    );
}

#[test(tokio::test)]
async fn discovery_confirms_contact() {
    let ctx = Context::new(PortFloors::default());
    let creds = meta_credentials();
    ctx.primary_members(&meta_addr(0), &[meta_addr(0)]);
    ctx.fake.respond(&meta_addr(0), metadata::META_NODES, vec![
        meta_row(1, &meta_addr(0), &creds),
        meta_row(2, &meta_addr(1), &creds),
        meta_row(3, &meta_addr(2), &creds),
    ]);

    assert_eq!(
        ctx.coordinator.discover_meta_primary().await.unwrap(),
        meta_addr(0)
    );
    assert_eq!(ctx.coordinator.meta_nodes().await.len(), 3);
    assert_eq!(
        ctx.coordinator.meta_ha_mode().await,
        HaMode::GroupReplication
    );

    // The count is only consulted without a visible primary.
    assert!(!ctx
        .fake
        .executed(&meta_addr(0))
        .iter()
        .any(|q| q == metadata::META_NODE_COUNT));
}

#[test(tokio::test)]
async fn discovery_switches_to_remote_primary() {
    let ctx = Context::new(PortFloors::default());
    let primary_creds = Credentials::new("pgx", "other_pwd");
    let roster = vec![
        meta_row(1, &meta_addr(0), &meta_credentials()),
        meta_row(2, &meta_addr(1), &primary_creds),
    ];

    ctx.primary_members(&meta_addr(0), &[meta_addr(1)]);
    ctx.fake
        .respond(&meta_addr(0), metadata::META_NODES, roster.clone());
    ctx.fake
        .require_credentials(&meta_addr(1), primary_creds.clone());
    ctx.fake.respond(&meta_addr(1), metadata::META_NODES, roster);

    let primary = ctx.coordinator.discover_meta_primary().await.unwrap();

    assert_eq!(primary, meta_addr(1));
    assert_eq!(ctx.coordinator.meta_primary_addr().await, Some(meta_addr(1)));
    assert_eq!(ctx.fake.executed(&meta_addr(1)), vec![metadata::META_NODES]);

    let topology = ctx.coordinator.snapshot().await;
    let meta = topology.meta();
    assert_eq!(meta.nodes().len(), 2);
    assert_eq!(meta.primary().map(Node::credentials), Some(&primary_creds));

    // Next round starts from the known primary.
    ctx.primary_members(&meta_addr(1), &[meta_addr(1)]);
    ctx.fake.clear_logs();
    assert_eq!(
        ctx.coordinator.discover_meta_primary().await.unwrap(),
        meta_addr(1)
    );
    assert!(ctx.fake.executed(&meta_addr(0)).is_empty());
}

#[test(tokio::test)]
async fn discovery_picks_up_rotated_credentials_of_new_primary() {
    let ctx = Context::new(PortFloors::default());
    let old_creds = Credentials::new("pgx", "old_pwd");
    let new_creds = Credentials::new("pgx", "new_pwd");

    ctx.primary_members(&meta_addr(0), &[meta_addr(0)]);
    ctx.fake.respond(&meta_addr(0), metadata::META_NODES, vec![
        meta_row(1, &meta_addr(0), &meta_credentials()),
        meta_row(2, &meta_addr(1), &old_creds),
    ]);
    let _ = ctx.coordinator.discover_meta_primary().await.unwrap();
    assert_eq!(ctx.coordinator.meta_nodes().await.len(), 2);

    // Failover to a node whose password was changed meanwhile.
    let roster = vec![
        meta_row(1, &meta_addr(0), &meta_credentials()),
        meta_row(2, &meta_addr(1), &new_creds),
    ];
    ctx.primary_members(&meta_addr(0), &[meta_addr(1)]);
    ctx.fake
        .respond(&meta_addr(0), metadata::META_NODES, roster.clone());
    ctx.fake.require_credentials(&meta_addr(1), new_creds.clone());
    ctx.fake.respond(&meta_addr(1), metadata::META_NODES, roster);

    assert_eq!(
        ctx.coordinator.discover_meta_primary().await.unwrap(),
        meta_addr(1)
    );

    let topology = ctx.coordinator.snapshot().await;
    let primary = topology.meta().primary().unwrap();
    assert_eq!(primary.credentials(), &new_creds);
    assert_eq!(primary.id(), 2);
    assert!(primary.session().is_healthy());
}

#[test(tokio::test)]
async fn discovery_rejects_multiple_primaries() {
    let ctx = Context::new(PortFloors::default());
    ctx.primary_members(&meta_addr(0), &[meta_addr(1), meta_addr(2)]);

    let err = ctx.coordinator.discover_meta_primary().await.unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::MultiplePrimaries(addrs) if addrs == vec![meta_addr(1), meta_addr(2)]
    ));
    assert_eq!(ctx.coordinator.meta_primary_addr().await, None);
    assert!(ctx.coordinator.meta_nodes().await.is_empty());
    assert_eq!(ctx.fake.executed(&meta_addr(0)), vec![
        metadata::PRIMARY_MEMBERS
    ]);
}

#[test(tokio::test)]
async fn discovery_restarts_from_bootstrap_after_primary_failure() {
    let ctx = Context::bootstrapped().await;
    ctx.fake.break_(&meta_addr(0));

    let err = ctx.coordinator.discover_meta_primary().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Node(err) if err.kind == ErrorKind::Connection));
    assert_eq!(ctx.coordinator.meta_primary_addr().await, None);

    // Metadata dependent operations are refused without a primary.
    assert!(matches!(
        ctx.coordinator.refresh_shards().await,
        Err(Error::MetaPrimaryUnknown)
    ));
    assert!(matches!(
        ctx.coordinator.stop_cluster("cluster1").await,
        Err(Error::MetaPrimaryUnknown)
    ));

    ctx.fake.repair(&meta_addr(0));
    assert_eq!(
        ctx.coordinator.discover_meta_primary().await.unwrap(),
        meta_addr(0)
    );
}

#[test(tokio::test)]
async fn reconciliation_is_idempotent() {
    let ctx = Context::bootstrapped().await;
    ctx.respond_storage(storage_roster());

    let diff = ctx.coordinator.refresh_shards().await.unwrap();
    assert_eq!(diff.added.len(), 4);
    let before = ctx.coordinator.snapshot().await;

    let diff = ctx.coordinator.refresh_shards().await.unwrap();
    assert!(diff.is_empty());
    assert_eq!(
        ctx.coordinator.snapshot().await.clusters(),
        before.clusters()
    );
}

#[test(tokio::test)]
async fn reconciliation_matches_metadata() {
    let ctx = Context::populated().await;

    ctx.respond_storage(StorageRoster {
        clusters: vec![cluster_row(1, "cluster1")],
        shards: vec![shard_row(1, 1, "shard1"), shard_row(2, 1, "shard2")],
        nodes: vec![
            node_row(1, 1, 1, &storage_addr(1, 3306), false),
            node_row(3, 1, 2, &storage_addr(2, 3310), true),
            node_row(5, 1, 1, &storage_addr(1, 3308), true),
        ],
    });

    let diff = ctx.coordinator.refresh_shards().await.unwrap();

    let mut removed: Vec<_> = diff.removed.iter().map(Node::id).collect();
    removed.sort_unstable();
    assert_eq!(removed, vec![2, 4]);
    assert_eq!(diff.added.iter().map(Node::id).collect::<Vec<_>>(), vec![
        5
    ]);
    assert_eq!(diff.updated.len(), 1);
    assert_eq!(diff.updated[0].old.addr(), &storage_addr(2, 3306));
    assert_eq!(diff.updated[0].new.addr(), &storage_addr(2, 3310));

    assert!(!ctx.coordinator.has_cluster("cluster2").await);
    assert_eq!(
        ctx.coordinator.restore_targets("cluster1").await,
        Some(vec![
            vec![storage_addr(1, 3306), storage_addr(1, 3308)],
            vec![storage_addr(2, 3310)],
        ])
    );
    assert_eq!(
        ctx.coordinator.shard_primary("cluster1", "shard1").await,
        Some(storage_addr(1, 3308))
    );

    // Computers of the dropped cluster are gone as well.
    let topology = ctx.coordinator.snapshot().await;
    assert_eq!(topology.storage_node_count(), 3);
    assert_eq!(topology.computer_count(), 2);
}

#[test(tokio::test)]
async fn reconciliation_of_computers() {
    let ctx = Context::populated().await;
    ctx.respond_computers(vec![
        computer_row(2, 1, "comp2", &storage_addr(9, 6000)),
        computer_row(3, 1, "comp3", &storage_addr(9, 5434)),
    ]);

    let diff = ctx.coordinator.refresh_computers().await.unwrap();

    assert_eq!(diff.added.len(), 1);
    assert_eq!(diff.updated.len(), 1);
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(
        ctx.coordinator.computer_addrs("cluster1").await,
        Some(vec![storage_addr(9, 6000), storage_addr(9, 5434)])
    );
    assert_eq!(ctx.coordinator.max_computer_suffix("cluster1").await, Some(3));
}

#[test(tokio::test)]
async fn removing_primary_invalidates_it() {
    let ctx = Context::populated().await;

    assert!(ctx.coordinator.sync_cluster_info("cluster1").await.unwrap());
    assert!(ctx
        .fake
        .executed(&storage_addr(1, 3306))
        .iter()
        .any(|q| q.starts_with("REPLACE INTO cluster_info")));

    assert!(ctx
        .coordinator
        .stop_shard_node("cluster1", "shard1", &storage_addr(1, 3306))
        .await
        .unwrap());

    assert_eq!(
        ctx.coordinator.shard_primary("cluster1", "shard1").await,
        None
    );
    assert!(matches!(
        ctx.coordinator.sync_cluster_info("cluster1").await,
        Err(Error::PrimaryNotAvailable { shard, .. }) if shard == "shard1"
    ));
    assert!(!ctx.coordinator.sync_cluster_info("missing").await.unwrap());
}

#[test(tokio::test)]
async fn clearing_primaries() {
    let ctx = Context::populated().await;

    assert!(ctx.coordinator.clear_shard_primaries("cluster1").await);
    assert!(!ctx.coordinator.clear_shard_primaries("missing").await);
    assert_eq!(
        ctx.coordinator.shard_primary("cluster1", "shard2").await,
        None
    );

    // Learned again from the metadata store.
    let _ = ctx.coordinator.refresh_shards().await.unwrap();
    assert_eq!(
        ctx.coordinator.shard_primary("cluster1", "shard2").await,
        Some(storage_addr(2, 3306))
    );
}

#[test(tokio::test)]
async fn machine_ports_respect_floors_and_strides() {
    let ctx = Context::new(PortFloors {
        storage: 10000,
        compute: 20000,
    });
    ctx.primary_members(&meta_addr(0), &[meta_addr(0)]);
    let _ = ctx.coordinator.discover_meta_primary().await.unwrap();

    let host = "10.0.0.5";
    let [meta, storage, compute] = metadata::machine_usage(host);
    let mut empty = null_row(2);
    empty[0] = Some("0".into());
    ctx.fake.respond(&meta_addr(0), meta, vec![empty.clone()]);
    ctx.fake
        .respond(&meta_addr(0), storage.clone(), vec![row(["2", "10005"])]);
    ctx.fake.respond(&meta_addr(0), compute, vec![empty]);

    let machine = ctx.coordinator.machine_ports(host).await.unwrap();

    assert_eq!(machine.storage_instances, 2);
    assert_eq!(machine.compute_instances, 0);
    assert_eq!(machine.next_storage_port, 10008);
    assert_eq!(machine.next_compute_port, 20000);
    assert_eq!(ctx.coordinator.snapshot().await.machines(), &[machine.clone()]);

    // A storage instance needs three consecutive ports.
    ctx.fake
        .respond(&meta_addr(0), storage, vec![row(["3", "65532"])]);
    assert!(matches!(
        ctx.coordinator.machine_ports(host).await,
        Err(Error::PortsExhausted(err)) if err.class == "storage" && err.recorded == 65532
    ));
    assert_eq!(ctx.coordinator.snapshot().await.machines(), &[machine]);
}

#[test(tokio::test)]
async fn machines_from_metadata() {
    let ctx = Context::bootstrapped().await;
    let meta = meta_addr(0);
    let mut machine = row(["10.0.0.5", "", "64", "16"]);
    machine[1] = None;
    ctx.fake.respond(&meta, metadata::MACHINES, vec![
        row(["10.0.0.1", "rack1", "128", "32"]),
        machine,
    ]);
    ctx.fake
        .respond(&meta, metadata::has_machine("10.0.0.1"), vec![row(["1"])]);

    let machines = ctx.coordinator.machines().await.unwrap();

    assert_eq!(machines.len(), 2);
    assert_eq!(machines[0].rack_id.as_deref(), Some("rack1"));
    assert_eq!(machines[1].total_cpu_cores, 16);
    assert!(ctx.coordinator.has_machine("10.0.0.1").await.unwrap());
    assert!(!ctx.coordinator.has_machine("10.0.0.7").await.unwrap());
}

#[test(tokio::test)]
async fn failed_persistence_keeps_in_memory_change() {
    let ctx = Context::populated().await;
    ctx.fake.fail_prefix(&meta_addr(0), "DELETE FROM");

    let res = ctx.coordinator.stop_cluster("cluster1").await;

    assert!(matches!(
        res,
        Err(Error::Persistence { op, source }) if op == "cluster removal"
            && source.kind == ErrorKind::Query
    ));
    assert!(!ctx.coordinator.has_cluster("cluster1").await);
    assert!(ctx.coordinator.has_cluster("cluster2").await);
}

#[test(tokio::test)]
async fn stopping_entities() {
    let ctx = Context::populated().await;
    let meta = meta_addr(0);

    assert!(ctx.coordinator.stop_computer("cluster1", "comp1").await.unwrap());
    assert!(!ctx.coordinator.stop_computer("cluster1", "comp1").await.unwrap());
    assert_eq!(
        ctx.coordinator.computer_addr("cluster1", "comp2").await,
        Some(storage_addr(9, 5433))
    );

    assert!(ctx.coordinator.stop_shard("cluster1", "shard2").await.unwrap());
    assert_eq!(
        ctx.coordinator.shard_names("cluster1").await,
        Some(vec!["shard1".to_owned()])
    );
    assert!(!ctx.coordinator.has_multiple_shards("cluster1").await);

    assert!(ctx.coordinator.stop_cluster("cluster2").await.unwrap());
    assert!(!ctx.coordinator.stop_cluster("cluster2").await.unwrap());

    let executed = ctx.fake.executed(&meta);
    assert!(executed.contains(&metadata::delete_computer("cluster1", "comp1")));
    for stmt in metadata::delete_shard("cluster1", "shard2") {
        assert!(executed.contains(&stmt));
    }
    for stmt in metadata::delete_cluster("cluster2") {
        assert!(executed.contains(&stmt));
    }
}

#[test(tokio::test)]
async fn adding_shard_nodes() {
    let ctx = Context::populated().await;
    let meta = meta_addr(0);
    ctx.fake
        .respond(&meta, metadata::MAX_SHARD_NODE_ID, vec![row(["10"])]);

    let creds = Credentials::new("agent", "agent_pwd");
    let added = ctx
        .coordinator
        .add_shard_nodes("cluster1", "shard2", vec![
            Endpoint::new(storage_addr(2, 3307), creds.clone()),
            Endpoint::new(storage_addr(2, 3308), creds.clone()),
        ])
        .await
        .unwrap();

    assert!(added);
    assert!(ctx.coordinator.has_multiple_shard_nodes("cluster1", "shard2").await);

    let topology = ctx.coordinator.snapshot().await;
    let shard = topology.cluster("cluster1").unwrap().shard("shard2").unwrap();
    let ids: Vec<_> = shard.nodes().iter().map(Node::id).collect();
    assert_eq!(ids, vec![3, 11, 12]);

    let inserts: Vec<_> = ctx
        .fake
        .executed(&meta)
        .into_iter()
        .filter(|q| q.starts_with("INSERT INTO shard_nodes"))
        .collect();
    assert_eq!(inserts.len(), 2);
    assert!(inserts[0].contains("VALUES (11, 2, 1, '10.0.0.2', 3307"));

    let duplicate = ctx
        .coordinator
        .add_shard_nodes("cluster1", "shard2", vec![Endpoint::new(
            storage_addr(2, 3308),
            creds.clone(),
        )])
        .await;
    assert!(matches!(duplicate, Err(Error::DuplicateNode(addr)) if addr == storage_addr(2, 3308)));

    let missing = ctx
        .coordinator
        .add_shard_nodes("cluster1", "shard9", vec![Endpoint::new(
            storage_addr(2, 3309),
            creds,
        )])
        .await;
    assert!(!missing.unwrap());
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn readers_observe_complete_reconciliations() {
    let ctx = Context::bootstrapped().await;
    ctx.respond_storage(storage_roster());
    let _ = ctx.coordinator.refresh_shards().await.unwrap();

    let before = vec!["shard1".to_owned(), "shard2".to_owned()];
    let after = vec!["shard3".to_owned(), "shard4".to_owned(), "shard5".to_owned()];

    ctx.respond_storage(StorageRoster {
        clusters: vec![cluster_row(1, "cluster1")],
        shards: vec![
            shard_row(3, 1, "shard3"),
            shard_row(4, 1, "shard4"),
            shard_row(5, 1, "shard5"),
        ],
        nodes: vec![],
    });
    ctx.fake.set_latency(Duration::from_millis(20));

    let coordinator = ctx.coordinator.clone();
    let refresh = tokio::spawn(async move { coordinator.refresh_shards().await });

    let readers: Vec<_> = (0..8)
        .map(|i| {
            let coordinator = ctx.coordinator.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i * 10)).await;
                coordinator.shard_names("cluster1").await
            })
        })
        .collect();

    for reader in readers {
        let names = reader.await.unwrap().unwrap();
        assert!(names == before || names == after, "{names:?}");
    }

    assert!(refresh.await.unwrap().is_ok());
    assert_eq!(ctx.coordinator.shard_names("cluster1").await, Some(after));
}

#[test(tokio::test)]
async fn variables() {
    let ctx = Context::populated().await;
    let node = storage_addr(1, 3307);
    ctx.fake.set_variable(&node, "max_connections", "100");

    assert!(matches!(
        ctx.coordinator.get_variable(&node, "max_connections").await,
        VariableOutcome::Done(value) if value == "100"
    ));

    let value = VariableValue::Int(512);
    assert!(matches!(
        ctx.coordinator.set_variable(&node, "max_connections", &value).await,
        VariableOutcome::Done(())
    ));
    assert_eq!(
        ctx.fake.variable(&node, "max_connections").as_deref(),
        Some("512")
    );

    // Meta nodes and computers are reachable as well.
    let value = VariableValue::Str("ON".into());
    assert!(matches!(
        ctx.coordinator.set_variable(&meta_addr(0), "read_only", &value).await,
        VariableOutcome::Done(())
    ));
    assert!(matches!(
        ctx.coordinator
            .set_variable(&storage_addr(9, 5432), "work_mem", &value)
            .await,
        VariableOutcome::Done(())
    ));

    assert!(matches!(
        ctx.coordinator
            .get_variable(&storage_addr(7, 1), "max_connections")
            .await,
        VariableOutcome::NodeNotFound
    ));
    assert!(matches!(
        ctx.coordinator.get_variable(&node, "unknown").await,
        VariableOutcome::Failed(Error::UnknownVariable(_))
    ));
    assert!(matches!(
        ctx.coordinator.get_variable(&node, "x'; DROP").await,
        VariableOutcome::Failed(Error::InvalidVariable(_))
    ));

    ctx.fake.break_(&node);
    assert!(matches!(
        ctx.coordinator.get_variable(&node, "max_connections").await,
        VariableOutcome::Failed(Error::Node(_))
    ));
    let topology = ctx.coordinator.snapshot().await;
    let session = topology.find_node(&node).unwrap().session();
    assert_eq!(session.consecutive_failures(), 1);
    assert_eq!(session.last_error(), Some(ErrorKind::Connection));
}

#[test(tokio::test)]
async fn shard_node_variables() {
    let ctx = Context::populated().await;
    let node = storage_addr(1, 3306);

    let vars = [
        ("max_connections".to_owned(), VariableValue::Int(1000)),
        ("sql_mode".to_owned(), VariableValue::Str("STRICT".into())),
    ];
    assert!(ctx
        .coordinator
        .set_shard_node_variables("cluster1", "shard1", &node, &vars)
        .await
        .unwrap());
    assert_eq!(ctx.fake.variable(&node, "sql_mode").as_deref(), Some("STRICT"));

    // Not a member of `shard2`.
    assert!(!ctx
        .coordinator
        .set_shard_node_variables("cluster1", "shard2", &node, &vars)
        .await
        .unwrap());
}

#[test(tokio::test)]
async fn views() {
    let ctx = Context::populated().await;
    let c = &ctx.coordinator;

    let clusters = c.clusters().await;
    assert_eq!(clusters.len(), 2);
    assert_eq!((clusters[0].shards, clusters[0].comps), (2, 2));

    assert!(c.has_shard("cluster1", "shard2").await);
    assert!(!c.has_shard("cluster1", "shard3").await);
    assert!(c.has_multiple_shard_nodes("cluster1", "shard1").await);
    assert!(c.has_multiple_computers("cluster1").await);
    assert!(!c.has_multiple_computers("cluster2").await);
    assert_eq!(c.shard_order("cluster1", "shard2").await, Some(1));
    assert_eq!(c.max_shard_suffix("cluster1").await, Some(2));
    assert_eq!(c.max_shard_suffix("missing").await, None);

    let nodes = c.storage_nodes("cluster1").await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].shard.as_deref(), Some("shard1"));
    assert_eq!(nodes[0].user, "agent");
    assert!(c.storage_nodes("missing").await.is_none());

    let comps = c.computers("cluster1").await.unwrap();
    assert_eq!(comps[1].comp.as_deref(), Some("comp2"));

    // Backups avoid primaries, single node shards are backed up anyway.
    assert_eq!(
        c.backup_targets("cluster1").await,
        Some(vec![storage_addr(1, 3307), storage_addr(2, 3306)])
    );

    assert_eq!(
        c.shard_addrs("cluster2").await,
        Some(vec![vec![storage_addr(3, 3306)]])
    );
    assert_eq!(
        c.shard_node_addrs("cluster1", "shard1").await,
        Some(vec![storage_addr(1, 3306), storage_addr(1, 3307)])
    );
    assert_eq!(
        c.restore_computer_targets("cluster1").await,
        Some(vec![storage_addr(9, 5432), storage_addr(9, 5433)])
    );

    let shape = c.cluster_shape("cluster1").await.unwrap();
    assert_eq!((shape.shards, shape.shard_nodes, shape.computers), (2, 2, 2));
    assert!(c.is_group_replicated("cluster1").await);
    assert!(!c.is_group_replicated("missing").await);

    let on_host: Vec<_> = c
        .instances(None, &["10.0.0.1".to_owned()])
        .await
        .into_iter()
        .map(|n| n.port)
        .collect();
    assert_eq!(on_host, vec![3306, 3307]);

    let meta = c.instances(Some(NodeKind::Meta), &[]).await;
    assert_eq!(meta.len(), 1);
    assert!(meta[0].cluster.is_none());

    assert_eq!(c.instances(None, &[]).await.len(), 7);
}

#[test(tokio::test)]
async fn empty_shards_have_no_backup_target() {
    let ctx = Context::bootstrapped().await;
    ctx.respond_storage(StorageRoster {
        clusters: vec![cluster_row(1, "cluster1")],
        shards: vec![shard_row(1, 1, "shard1")],
        nodes: vec![],
    });
    let _ = ctx.coordinator.refresh_shards().await.unwrap();

    assert_eq!(ctx.coordinator.backup_targets("cluster1").await, None);
    let shape = ctx.coordinator.cluster_shape("cluster1").await.unwrap();
    assert_eq!(shape.shard_nodes, 0);
}

#[test(tokio::test)]
async fn stats_are_pushed_to_computers_and_metadata() {
    let ctx = Context::populated().await;
    let source = storage_addr(1, 3306);
    ctx.fake.respond(&source, metadata::TABLE_STATS, vec![row([
        "db", "t1", "100", "32768",
    ])]);
    ctx.fake
        .respond(&source, metadata::SHARD_USAGE, vec![row(["1", "49152"])]);
    ctx.fake.break_(&storage_addr(3, 3306));

    let report = ctx.coordinator.refresh_stats().await.unwrap();
    assert_eq!(report, StatsReport {
        shards: 2,
        skipped: 1,
    });

    for computer in [storage_addr(9, 5432), storage_addr(9, 5433)] {
        let executed = ctx.fake.executed(&computer);
        assert!(executed.iter().any(|q| q.starts_with(
            "UPDATE pg_class SET reltuples = 100, relpages = 2 WHERE relname = 't1'"
        )));
        assert!(executed.iter().any(|q| q
            == "UPDATE pg_shard SET num_tablets = 1, space_volumn = 49152 WHERE id = 1"));
    }

    assert!(ctx
        .fake
        .executed(&meta_addr(0))
        .iter()
        .any(|q| q == "UPDATE shards SET num_tablets = 1, space_volumn = 49152 WHERE id = 1"));
}

#[test(tokio::test)]
async fn commit_log_truncation() {
    let ctx = Context::populated().await;
    let position = |addr: &NodeAddr, value: Option<&str>| {
        let cells = vec![value.map(ToOwned::to_owned)];
        ctx.fake
            .respond(addr, metadata::COMMIT_LOG_POSITION, vec![cells]);
    };
    let truncations = || {
        ctx.fake
            .executed(&meta_addr(0))
            .into_iter()
            .filter(|q| q.starts_with("CALL truncate_commit_log"))
            .collect::<Vec<_>>()
    };

    position(&storage_addr(1, 3306), Some("120"));
    position(&storage_addr(2, 3306), Some("80"));
    position(&storage_addr(3, 3306), None);

    assert_eq!(ctx.coordinator.truncate_commit_log().await.unwrap(), Some(80));
    assert_eq!(truncations(), vec![metadata::truncate_commit_log(80)]);

    // Same watermark, nothing to do.
    assert_eq!(ctx.coordinator.truncate_commit_log().await.unwrap(), None);
    assert_eq!(truncations().len(), 1);

    position(&storage_addr(2, 3306), Some("150"));
    assert_eq!(ctx.coordinator.truncate_commit_log().await.unwrap(), Some(120));

    // A shard which can't be read blocks the truncation.
    position(&storage_addr(1, 3306), Some("500"));
    position(&storage_addr(2, 3306), Some("500"));
    ctx.fake.break_(&storage_addr(3, 3306));
    assert!(ctx.coordinator.truncate_commit_log().await.is_err());
    assert_eq!(truncations().len(), 2);
}

#[test(tokio::test)]
async fn metadata_ids_and_statuses() {
    let ctx = Context::populated().await;
    let meta = meta_addr(0);
    ctx.fake
        .respond(&meta, metadata::MAX_CLUSTER_ID, vec![row(["2"])]);
    ctx.fake
        .respond(&meta, metadata::MAX_COMPUTER_ID, vec![null_row(1)]);

    assert_eq!(ctx.coordinator.max_cluster_id().await.unwrap(), 2);
    assert_eq!(ctx.coordinator.max_computer_id().await.unwrap(), 0);

    let node = storage_addr(1, 3306);
    ctx.coordinator
        .update_instance_status(&node, NodeKind::Storage, "dead")
        .await
        .unwrap();
    assert!(ctx.fake.executed(&meta).iter().any(|q| q
        == "UPDATE shard_nodes SET status = 'dead' WHERE hostaddr = '10.0.0.1' AND port = 3306"));

    assert!(matches!(
        ctx.coordinator
            .update_instance_status(&meta, NodeKind::Meta, "dead")
            .await,
        Err(Error::NoStatus(NodeKind::Meta))
    ));
}

#[test(tokio::test)]
async fn backup_info_of_dropped_cluster() {
    let ctx = Context::populated().await;
    let meta = meta_addr(0);
    let timestamp = "2021-12-29 10:39:00";
    ctx.fake.respond(
        &meta,
        metadata::backup_info("cluster2", timestamp),
        vec![row([
            "cluster2",
            "hdfs://backup/cluster2",
            "2021-12-29 10:00:00",
            "1",
            "1",
            "0",
            "mgr",
        ])],
    );
    let _ = ctx.coordinator.stop_cluster("cluster2").await.unwrap();

    let info = ctx
        .coordinator
        .backup_info("cluster2", timestamp)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.taken_at, "2021-12-29 10:00:00");
    assert_eq!(info.shards, 1);
    assert_eq!(info.ha_mode, HaMode::GroupReplication);

    let resp = ctx
        .coordinator
        .dispatch(Request::GetBackupInfo {
            backup_cluster_name: "cluster2".into(),
            timestamp: timestamp.into(),
        })
        .await;
    assert_eq!(resp, Response::Backup(info));

    let resp = ctx
        .coordinator
        .dispatch(Request::GetBackupInfo {
            backup_cluster_name: "cluster1".into(),
            timestamp: timestamp.into(),
        })
        .await;
    assert!(matches!(resp, Response::NotFound { .. }));

    ctx.fake.break_(&meta);
    assert!(matches!(
        ctx.coordinator.backup_info("cluster1", timestamp).await,
        Err(Error::Node(err)) if err.kind == ErrorKind::Connection
    ));
}

#[test(tokio::test)]
async fn dispatch() {
    let ctx = Context::populated().await;
    let c = &ctx.coordinator;

    let resp = c
        .dispatch(Request::ListStorageNodes {
            cluster_name: "cluster9".into(),
        })
        .await;
    assert_eq!(resp, Response::not_found("cluster cluster9"));

    let resp = c.dispatch(Request::ListMetaNodes).await;
    assert!(matches!(resp, Response::Nodes(nodes) if nodes.len() == 1));

    let resp = c
        .dispatch(Request::GetVariable {
            ip: "10.0.0.7".into(),
            port: 1,
            variable: "max_connections".into(),
        })
        .await;
    assert_eq!(resp, Response::Variable {
        result: false,
        value: None
    });

    ctx.fake
        .set_variable(&storage_addr(1, 3306), "max_connections", "100");
    let resp = c
        .dispatch(Request::GetVariable {
            ip: "10.0.0.1".into(),
            port: 3306,
            variable: "max_connections".into(),
        })
        .await;
    assert_eq!(resp, Response::Variable {
        result: true,
        value: Some("100".into())
    });

    let resp = c
        .dispatch(Request::StopComputer {
            cluster_name: "cluster1".into(),
            comp_name: "comp2".into(),
        })
        .await;
    assert_eq!(resp, Response::ok());

    let resp = c
        .dispatch(Request::StopShard {
            cluster_name: "cluster1".into(),
            shard_name: "shard9".into(),
        })
        .await;
    assert_eq!(resp, Response::not_found("shard cluster1/shard9"));

    ctx.fake.fail_prefix(&meta_addr(0), "DELETE FROM");
    let resp = c
        .dispatch(Request::StopCluster {
            cluster_name: "cluster2".into(),
        })
        .await;
    assert!(matches!(resp, Response::Status { result: false, error: Some(_) }));
}

#[test(tokio::test)]
async fn shutdown_releases_topology() {
    let ctx = Context::populated().await;

    assert_eq!(ctx.coordinator.shutdown().await, 2);

    let topology = ctx.coordinator.snapshot().await;
    assert!(topology.clusters().is_empty());
    assert!(topology.meta().nodes().is_empty());
    assert_eq!(ctx.coordinator.meta_primary_addr().await, None);
}
