//! Timeline Service: builds a ranked view over the current
//! projection snapshot, records it as a `timeline_served` event, and hands
//! the items back to the caller.

use feedsim_core::{
    to_canonical_json, EventKind, FeatureVec, RankingAlgorithm, RunId, Tick, TimelineId,
    TimelineItemPayload, TimelineServedPayload, UserId,
};
use itertools::Itertools as _;
use snafu::ResultExt as _;
use tracing::debug;

use crate::errors::{DbResult, MalformedPayloadSnafu};
use crate::ranker::{rank, Candidate, RANKING_VERSION};
use crate::reducer::apply_event_tx;
use crate::store::{Store, LOG_TARGET};
use crate::tables;

/// `timeline(user_id, algorithm, k, seed) -> (timeline_id, items)`. Runs
/// entirely inside one write transaction: reading the projection snapshot,
/// ranking, minting a `timeline_id`, appending the `timeline_served` event
/// and applying its projection effect are all serialized with respect to
/// any other writer, matching the single-writer model.
pub async fn timeline(
    store: &Store,
    run_id: RunId,
    user_id: UserId,
    algorithm: RankingAlgorithm,
    k: u32,
    seed: u64,
) -> DbResult<(TimelineId, Vec<TimelineItemPayload>)> {
    store
        .write_with(|tx| {
            let meta_table = tx.open_table(&tables::meta::TABLE)?;
            let meta = Store::read_meta_tx(&meta_table)?;
            drop(meta_table);
            let current_tick = Tick(meta.current_tick);

            let posts_table = tx.open_table(&tables::posts::TABLE)?;
            let candidates = posts_table
                .range(..)?
                .map_ok(|(post_id, v)| {
                    let record = v.value();
                    Candidate {
                        post_id: post_id.value(),
                        up_votes: record.up_votes,
                        created_tick: record.created_tick,
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            drop(posts_table);

            let ranked = rank(&candidates, algorithm, current_tick, seed, k);

            let counter = meta.timeline_counter;
            let timeline_id = TimelineId::derive(run_id, user_id, current_tick, algorithm.as_str(), seed, counter);

            let items: Vec<TimelineItemPayload> = ranked
                .into_iter()
                .enumerate()
                .map(|(position, item)| TimelineItemPayload {
                    post_id: item.post_id,
                    position: position as u32,
                    score: item.score,
                    features: FeatureVec {
                        up_votes: item.up_votes,
                        age: item.age,
                        algorithm,
                        ranking_version: RANKING_VERSION,
                    },
                })
                .collect();

            let payload = TimelineServedPayload {
                timeline_id,
                user_id,
                k,
                algorithm,
                ranking_version: RANKING_VERSION,
                seed,
                items: items.clone(),
            };
            let payload_json = to_canonical_json(&payload).context(MalformedPayloadSnafu)?;

            let record = Store::append_tx(tx, EventKind::TimelineServed, current_tick, payload_json)?;
            apply_event_tx(tx, &record)?;

            let mut meta_table = tx.open_table(&tables::meta::TABLE)?;
            let mut meta = Store::read_meta_tx(&meta_table)?;
            meta.timeline_counter = counter + 1;
            meta_table.insert(&(), &meta)?;

            debug!(target: LOG_TARGET, %timeline_id, %user_id, items = items.len(), "Timeline served");

            Ok((timeline_id, items))
        })
        .await
}
