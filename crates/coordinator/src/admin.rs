use {
    crate::{Coordinator, Result, VariableOutcome},
    admin_api::{NodeSpec, Request, Response},
    node_api::{Credentials, Endpoint, NodeAddr, NodeConnection},
};

impl<C: NodeConnection> Coordinator<C> {
    /// Executes an admin [`Request`].
    pub async fn dispatch(&self, req: Request) -> Response {
        match req {
            Request::ListMetaNodes => Response::Nodes(self.meta_nodes().await),
            Request::ListClusters => Response::Clusters(self.clusters().await),
            Request::ListStorageNodes { cluster_name } => {
                match self.storage_nodes(&cluster_name).await {
                    Some(nodes) => Response::Nodes(nodes),
                    None => cluster_not_found(&cluster_name),
                }
            }
            Request::ListComputers { cluster_name } => {
                match self.computers(&cluster_name).await {
                    Some(nodes) => Response::Nodes(nodes),
                    None => cluster_not_found(&cluster_name),
                }
            }
            Request::ListInstances { kind, hosts } => {
                Response::Nodes(self.instances(kind, &hosts).await)
            }
            Request::GetVariable { ip, port, variable } => {
                let addr = NodeAddr::new(ip, port);
                match self.get_variable(&addr, &variable).await {
                    VariableOutcome::Done(value) => Response::Variable {
                        result: true,
                        value: Some(value),
                    },
                    outcome => variable_failed(&addr, outcome),
                }
            }
            Request::SetVariable {
                ip,
                port,
                variable,
                value,
            } => {
                let addr = NodeAddr::new(ip, port);
                match self.set_variable(&addr, &variable, &value).await {
                    VariableOutcome::Done(()) => Response::Variable {
                        result: true,
                        value: None,
                    },
                    outcome => variable_failed(&addr, outcome),
                }
            }
            Request::AddShardNodes {
                cluster_name,
                shard_name,
                nodes,
            } => {
                let endpoints = nodes.into_iter().map(endpoint).collect();
                let res = self
                    .add_shard_nodes(&cluster_name, &shard_name, endpoints)
                    .await;
                status(res, || format!("shard {cluster_name}/{shard_name}"))
            }
            Request::StopCluster { cluster_name } => {
                let res = self.stop_cluster(&cluster_name).await;
                status(res, || format!("cluster {cluster_name}"))
            }
            Request::StopShard {
                cluster_name,
                shard_name,
            } => {
                let res = self.stop_shard(&cluster_name, &shard_name).await;
                status(res, || format!("shard {cluster_name}/{shard_name}"))
            }
            Request::StopShardNode {
                cluster_name,
                shard_name,
                ip,
                port,
            } => {
                let addr = NodeAddr::new(ip, port);
                let res = self
                    .stop_shard_node(&cluster_name, &shard_name, &addr)
                    .await;
                status(res, || format!("node {addr} of shard {cluster_name}/{shard_name}"))
            }
            Request::StopComputer {
                cluster_name,
                comp_name,
            } => {
                let res = self.stop_computer(&cluster_name, &comp_name).await;
                status(res, || format!("computer {cluster_name}/{comp_name}"))
            }
            Request::GetBackupInfo {
                backup_cluster_name,
                timestamp,
            } => match self.backup_info(&backup_cluster_name, &timestamp).await {
                Ok(Some(info)) => Response::Backup(info),
                Ok(None) => Response::not_found(format!(
                    "backup of cluster {backup_cluster_name} at {timestamp}"
                )),
                Err(err) => {
                    tracing::warn!(?err, "Backup lookup failed");
                    Response::failed(err)
                }
            },
        }
    }
}

fn endpoint(spec: NodeSpec) -> Endpoint {
    Endpoint::new(
        NodeAddr::new(spec.ip, spec.port),
        Credentials::new(spec.user, spec.password),
    )
}

fn cluster_not_found(name: &str) -> Response {
    Response::not_found(format!("cluster {name}"))
}

fn variable_failed<T>(addr: &NodeAddr, outcome: VariableOutcome<T>) -> Response {
    match outcome {
        VariableOutcome::NodeNotFound => tracing::info!(%addr, "Variable of an unknown node"),
        VariableOutcome::Failed(err) => tracing::warn!(?err, %addr, "Variable operation failed"),
        VariableOutcome::Done(_) => {}
    }

    Response::Variable {
        result: false,
        value: None,
    }
}

fn status(res: Result<bool>, entity: impl FnOnce() -> String) -> Response {
    match res {
        Ok(true) => Response::ok(),
        Ok(false) => Response::not_found(entity()),
        Err(err) => {
            tracing::warn!(?err, "Admin request failed");
            Response::failed(err)
        }
    }
}
