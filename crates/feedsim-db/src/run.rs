//! Starting a run: appends `run_started` then `run_config`.
//! Both events exist so the log alone documents what a run was configured to
//! do, without a dedicated `runs` projection table (see `reducer`'s
//! `apply_run_started_tx` doc comment for why).

use feedsim_core::{
    to_canonical_json, EventKind, RankingAlgorithm, RunConfigPayload, RunId, RunStartedPayload, Tick,
};
use snafu::ResultExt as _;
use tracing::info;

use crate::errors::{DbResult, MalformedPayloadSnafu};
use crate::reducer::apply_event_tx;
use crate::store::{Store, LOG_TARGET};
use crate::tables;

/// `start_run(seed, agents, algorithm, k, ticks) -> run_id`.
/// `RunId` is just `seed` (see [`feedsim_core::RunId`]'s doc comment), so
/// this is also how a caller recovers the id to pass into `timeline()`.
#[allow(clippy::too_many_arguments)]
pub async fn start_run(
    store: &Store,
    seed: u64,
    agents: u32,
    algorithm: RankingAlgorithm,
    k: u32,
    ticks: u64,
) -> DbResult<RunId> {
    let run_id = RunId(seed);

    store
        .write_with(|tx| {
            let meta_table = tx.open_table(&tables::meta::TABLE)?;
            let current_tick = Tick(Store::read_meta_tx(&meta_table)?.current_tick);
            drop(meta_table);

            let started = RunStartedPayload {
                run_id,
                started_tick: current_tick,
            };
            let started_json = to_canonical_json(&started).context(MalformedPayloadSnafu)?;
            let record = Store::append_tx(tx, EventKind::RunStarted, current_tick, started_json)?;
            apply_event_tx(tx, &record)?;

            let config = RunConfigPayload {
                run_id,
                seed,
                agents,
                ranking_algorithm: algorithm,
                k,
                ticks,
            };
            let config_json = to_canonical_json(&config).context(MalformedPayloadSnafu)?;
            let record = Store::append_tx(tx, EventKind::RunConfig, current_tick, config_json)?;
            apply_event_tx(tx, &record)?;

            info!(target: LOG_TARGET, %run_id, seed, agents, ticks, "Run started");
            Ok(run_id)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn start_run_seeds_every_agent() {
        let store = Store::open_in_memory().await.unwrap();
        store.init(false).await.unwrap();

        let run_id = start_run(&store, 7, 3, RankingAlgorithm::Hot, 5, 10).await.unwrap();
        assert_eq!(run_id, RunId(7));

        let events = store.scan(feedsim_core::Seq(0)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::RunStarted);
        assert_eq!(events[1].kind, EventKind::RunConfig);
    }
}
