use {
    crate::{metadata, Coordinator, Result},
    domain::Topology,
    node_api::{Endpoint, NodeConnection, TimeoutClass},
    tap::TapFallible,
};

impl<C: NodeConnection> Coordinator<C> {
    /// Truncates the commit log up to the oldest position still required by
    /// a consumer on any shard of any cluster.
    ///
    /// The first cluster drives the truncation for all of them. Nothing is
    /// truncated if any shard can't be read, if no shard reports a position,
    /// or if the watermark didn't advance since the last truncation.
    ///
    /// Returns the watermark the commit log was truncated to.
    pub async fn truncate_commit_log(&self) -> Result<Option<u64>> {
        metrics::counter!("cmgr_refresh_total", "job" => "commit_log").increment(1);

        let mut state = self.lock().await;
        let Some(designated) = state.topology.clusters().first() else {
            return Ok(None);
        };
        let designated = designated.name().to_owned();
        let _ = Self::meta_primary(&state.topology)?;

        let watermark = self
            .oldest_commit_log_position(&mut state.topology)
            .await
            .tap_err(|err| {
                metrics::counter!("cmgr_refresh_failures_total", "job" => "commit_log")
                    .increment(1);
                tracing::warn!(?err, cluster = %designated, "Failed to read commit log positions");
            })?;

        let Some(watermark) = watermark else {
            return Ok(None);
        };

        if state
            .commit_log_watermark
            .is_some_and(|last| watermark <= last)
        {
            tracing::debug!(watermark, "Commit log already truncated");
            return Ok(None);
        }

        let stmt = metadata::truncate_commit_log(watermark);
        let _ = self
            .execute_meta(&mut state.topology, &stmt, TimeoutClass::Long)
            .await?;

        state.commit_log_watermark = Some(watermark);
        tracing::info!(watermark, cluster = %designated, "Commit log truncated");

        Ok(Some(watermark))
    }

    /// Returns the smallest position reported by the shards, [`None`] if no
    /// shard reports one.
    async fn oldest_commit_log_position(&self, topology: &mut Topology) -> Result<Option<u64>> {
        let sources: Vec<Endpoint> = topology
            .clusters()
            .iter()
            .flat_map(|c| c.shards())
            .filter_map(|s| s.primary().or_else(|| s.nodes().first()))
            .map(|n| n.endpoint().clone())
            .collect();

        let mut watermark: Option<u64> = None;
        for endpoint in sources {
            let rows = self
                .execute(
                    topology,
                    &endpoint,
                    metadata::COMMIT_LOG_POSITION,
                    TimeoutClass::Normal,
                )
                .await?;

            if let Some(position) = metadata::parse_scalar::<u64>(&rows)? {
                watermark = Some(watermark.map_or(position, |w| w.min(position)));
            }
        }

        Ok(watermark)
    }
}
