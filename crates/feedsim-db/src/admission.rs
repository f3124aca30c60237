//! Action Admission: validates a proposed action, checks
//! idempotency and the exposure tie, appends the resulting `action` event
//! (accepted or rejected), and applies its projection effect — all inside
//! one serialized write transaction.

use feedsim_core::{
    to_canonical_json, ActionPayload, ActionStatus, ActionType, EventKind, OpId, PostId, RejectReason, Tick, TimelineId, UserId,
    validate_shape,
};
use snafu::ResultExt as _;
use tracing::debug;

use crate::errors::{DbResult, MalformedPayloadSnafu};
use crate::reducer::apply_event_tx;
use crate::store::{Store, WriteTransactionCtx, LOG_TARGET};
use crate::tables::{self, ActionOutcomeRecord};

/// Everything the caller supplies for one `act()` call; shaped
/// as a flat request rather than re-using [`ActionPayload`] directly so the
/// caller never has to pre-guess `status`/`reason`, which are this module's
/// job to decide.
#[derive(Debug, Clone)]
pub struct ActRequest {
    pub op_id: OpId,
    pub actor_id: UserId,
    pub action_type: ActionType,
    pub timeline_id: Option<TimelineId>,
    pub position: Option<u32>,
    pub target_post_id: Option<PostId>,
    pub target_user_id: Option<UserId>,
    pub body: Option<String>,
}

/// The outcome `act()` returns: the recorded `action` event's `status`, and
/// — for a rejection — the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActOutcome {
    pub status: ActionStatus,
    pub reason: Option<RejectReason>,
}

impl ActOutcome {
    pub fn accepted(&self) -> bool {
        self.status == ActionStatus::Accepted
    }
}

/// `act(op_id, actor_id, action_type, params) -> AcceptedOrRejected`. `tick`
/// is the current simulation tick, supplied by the caller (the driver loop)
/// rather than read fresh here, since admission never advances the clock
/// itself — that's a separate, explicit step.
pub async fn act(store: &Store, tick: Tick, req: ActRequest) -> DbResult<ActOutcome> {
    store
        .write_with(|tx| {
            if let Some(existing) = Store::lookup_op_id_tx(tx, &req.op_id)? {
                debug!(target: LOG_TARGET, op_id = %req.op_id, "Idempotent replay of action, not re-appended");
                return Ok(ActOutcome {
                    status: existing.status,
                    reason: existing.reason,
                });
            }

            let mut payload = ActionPayload {
                op_id: req.op_id.clone(),
                actor_id: req.actor_id,
                action_type: req.action_type,
                timeline_id: req.timeline_id,
                position: req.position,
                target_post_id: req.target_post_id,
                target_user_id: req.target_user_id,
                body: req.body,
                status: ActionStatus::Accepted,
                reason: None,
            };

            let mut reject = validate_shape(&payload).err();
            if reject.is_none() {
                reject = check_exposure_tie_tx(tx, &payload)?;
            }
            if reject.is_none() {
                reject = check_semantics_tx(tx, &payload)?;
            }

            if let Some(reason) = reject {
                payload.status = ActionStatus::Rejected;
                payload.reason = Some(reason);
            }

            let payload_json = to_canonical_json(&payload).context(MalformedPayloadSnafu)?;
            let record = Store::append_tx(tx, EventKind::Action, tick, payload_json)?;

            let mut op_id_table = tx.open_table(&tables::events_by_op_id::TABLE)?;
            op_id_table.insert(
                &payload.op_id,
                &ActionOutcomeRecord {
                    seq: record.seq,
                    status: payload.status,
                    reason: payload.reason,
                },
            )?;
            drop(op_id_table);

            apply_event_tx(tx, &record)?;

            Ok(ActOutcome {
                status: payload.status,
                reason: payload.reason,
            })
        })
        .await
}

/// Exposure tie: `comment`/`like`/`unlike` must reference a `timeline_served`
/// item actually served to this actor at that position.
fn check_exposure_tie_tx(tx: &WriteTransactionCtx, payload: &ActionPayload) -> DbResult<Option<RejectReason>> {
    match payload.action_type {
        ActionType::Comment | ActionType::Like | ActionType::Unlike => {}
        ActionType::Post | ActionType::Follow | ActionType::Unfollow => return Ok(None),
    }

    let timeline_id = payload
        .timeline_id
        .expect("validate_shape already required timeline_id for this action_type");
    let position = payload
        .position
        .expect("validate_shape already required position for this action_type");
    let target_post_id = payload
        .target_post_id
        .expect("validate_shape already required target_post_id for this action_type");

    let timelines_table = tx.open_table(&tables::timelines::TABLE)?;
    let Some(served) = timelines_table.get(&timeline_id)?.map(|g| g.value()) else {
        return Ok(Some(RejectReason::OffFeed));
    };
    drop(timelines_table);

    if served.user_id != payload.actor_id {
        return Ok(Some(RejectReason::OffFeed));
    }

    let items_table = tx.open_table(&tables::timeline_items::TABLE)?;
    let Some(item) = items_table.get(&(timeline_id, position))?.map(|g| g.value()) else {
        return Ok(Some(RejectReason::OffFeed));
    };

    if item.post_id != target_post_id {
        return Ok(Some(RejectReason::OffFeed));
    }

    Ok(None)
}

/// Semantic validation that needs projection state: duplicate/missing votes
/// and follow edges. `self_follow` and `empty_body` are structural and
/// already handled by `validate_shape`.
fn check_semantics_tx(tx: &WriteTransactionCtx, payload: &ActionPayload) -> DbResult<Option<RejectReason>> {
    match payload.action_type {
        ActionType::Like => {
            let post_id = payload.target_post_id.expect("validated by check_exposure_tie_tx");
            let votes_table = tx.open_table(&tables::votes::TABLE)?;
            if votes_table.get(&(payload.actor_id, post_id))?.is_some() {
                return Ok(Some(RejectReason::DuplicateVote));
            }
            Ok(None)
        }
        ActionType::Unlike => {
            let post_id = payload.target_post_id.expect("validated by check_exposure_tie_tx");
            let votes_table = tx.open_table(&tables::votes::TABLE)?;
            if votes_table.get(&(payload.actor_id, post_id))?.is_none() {
                return Ok(Some(RejectReason::NoSuchVote));
            }
            Ok(None)
        }
        ActionType::Follow => {
            let target = payload.target_user_id.expect("validated by validate_shape");
            let follows_table = tx.open_table(&tables::follows::TABLE)?;
            if follows_table.get(&(payload.actor_id, target))?.is_some() {
                return Ok(Some(RejectReason::DuplicateFollow));
            }
            Ok(None)
        }
        ActionType::Unfollow => {
            let target = payload.target_user_id.expect("validated by validate_shape");
            let follows_table = tx.open_table(&tables::follows::TABLE)?;
            if follows_table.get(&(payload.actor_id, target))?.is_none() {
                return Ok(Some(RejectReason::NoSuchFollow));
            }
            Ok(None)
        }
        ActionType::Post | ActionType::Comment => Ok(None),
    }
}
