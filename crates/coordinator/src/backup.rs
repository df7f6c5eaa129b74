use {
    crate::{metadata, Coordinator, Result},
    admin_api::BackupInfo,
    node_api::{NodeConnection, TimeoutClass},
};

impl<C: NodeConnection> Coordinator<C> {
    /// Looks up the latest backup of `cluster` taken at or before
    /// `timestamp` in the metadata store.
    ///
    /// The cluster doesn't have to be part of the topology anymore.
    pub async fn backup_info(&self, cluster: &str, timestamp: &str) -> Result<Option<BackupInfo>> {
        let mut state = self.lock().await;
        let rows = self
            .execute_meta(
                &mut state.topology,
                &metadata::backup_info(cluster, timestamp),
                TimeoutClass::Normal,
            )
            .await?;

        let info = rows.first().map(metadata::parse_backup_info).transpose()?;
        if info.is_none() {
            tracing::info!(cluster, timestamp, "No backup found");
        }

        Ok(info)
    }
}
