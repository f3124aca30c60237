//! Tick Clock: the monotonic tick counter driven by
//! `advance_tick` events.

use feedsim_core::{to_canonical_json, AdvanceTickPayload, EventKind, Tick};
use snafu::ResultExt as _;
use tracing::debug;

use crate::errors::{DbResult, MalformedPayloadSnafu};
use crate::reducer::apply_event_tx;
use crate::store::{Store, LOG_TARGET};
use crate::tables;

/// `advance_tick()`: appends an `advance_tick` event with
/// `new_tick = current_tick + 1` and applies it. This is the only path by
/// which the simulation's tick normally moves forward; `TickRegression` is
/// reachable only by constructing a malformed `advance_tick` event directly,
/// which this helper never does.
pub async fn advance_tick(store: &Store) -> DbResult<Tick> {
    store
        .write_with(|tx| {
            let meta_table = tx.open_table(&tables::meta::TABLE)?;
            let current = Tick(Store::read_meta_tx(&meta_table)?.current_tick);
            drop(meta_table);

            let new_tick = current.next();
            let payload = AdvanceTickPayload { new_tick };
            let payload_json = to_canonical_json(&payload).context(MalformedPayloadSnafu)?;

            let record = Store::append_tx(tx, EventKind::AdvanceTick, new_tick, payload_json)?;
            apply_event_tx(tx, &record)?;

            debug!(target: LOG_TARGET, tick = new_tick.0, "Tick advanced");
            Ok(new_tick)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn advance_tick_is_monotonic() {
        let store = Store::open_in_memory().await.unwrap();
        store.init(false).await.unwrap();

        assert_eq!(advance_tick(&store).await.unwrap(), Tick(1));
        assert_eq!(advance_tick(&store).await.unwrap(), Tick(2));
        assert_eq!(store.current_tick().await.unwrap(), Tick(2));
    }
}
