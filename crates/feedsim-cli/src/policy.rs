//! Minimal seeded agent policy driving `simulate`. Deliberately
//! simple: each agent owns a `ChaCha8Rng` seeded from `(run_seed,
//! agent_index)`, so a given run seed always produces the same sequence of
//! proposals regardless of wall-clock timing or thread scheduling.

use feedsim_core::{ActionType, OpId, PostId, TimelineId, TimelineItemPayload, UserId};
use rand::Rng as _;
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

/// Probability an agent does nothing this tick.
const NOOP_PROBABILITY: f64 = 0.35;

pub struct Agent {
    pub user_id: UserId,
    rng: ChaCha8Rng,
}

/// What an [`Agent`] wants to do, already shaped close to [`feedsim_db::ActRequest`]
/// but without `op_id`/`actor_id`, which the driver loop fills in.
pub struct Proposal {
    pub action_type: ActionType,
    pub timeline_id: Option<TimelineId>,
    pub position: Option<u32>,
    pub target_post_id: Option<PostId>,
    pub target_user_id: Option<UserId>,
    pub body: Option<String>,
}

impl Agent {
    pub fn new(run_seed: u64, agent_index: u32) -> Self {
        let agent_seed = run_seed ^ u64::from(agent_index).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            user_id: UserId(u64::from(agent_index)),
            rng: ChaCha8Rng::seed_from_u64(agent_seed),
        }
    }

    /// Proposes at most one action given the timeline just served to this
    /// agent. `peers` is every other known user id, used to pick
    /// a follow/unfollow target.
    pub fn propose(
        &mut self,
        timeline_id: TimelineId,
        items: &[TimelineItemPayload],
        peers: &[UserId],
    ) -> Option<Proposal> {
        if self.rng.random_bool(NOOP_PROBABILITY) {
            return None;
        }

        let bucket = if items.is_empty() {
            if peers.is_empty() { 0 } else { self.rng.random_range(0..2) }
        } else if peers.is_empty() {
            self.rng.random_range(0..3)
        } else {
            self.rng.random_range(0..4)
        };

        match bucket {
            0 => Some(Proposal {
                action_type: ActionType::Post,
                timeline_id: None,
                position: None,
                target_post_id: None,
                target_user_id: None,
                body: Some(self.random_body()),
            }),
            1 if !items.is_empty() => {
                let item = &items[self.rng.random_range(0..items.len())];
                Some(Proposal {
                    action_type: ActionType::Like,
                    timeline_id: Some(timeline_id),
                    position: Some(item.position),
                    target_post_id: Some(item.post_id),
                    target_user_id: None,
                    body: None,
                })
            }
            2 if !items.is_empty() => {
                let item = &items[self.rng.random_range(0..items.len())];
                Some(Proposal {
                    action_type: ActionType::Comment,
                    timeline_id: Some(timeline_id),
                    position: Some(item.position),
                    target_post_id: Some(item.post_id),
                    target_user_id: None,
                    body: Some(self.random_body()),
                })
            }
            _ if !peers.is_empty() => {
                let target = peers[self.rng.random_range(0..peers.len())];
                Some(Proposal {
                    action_type: ActionType::Follow,
                    timeline_id: None,
                    position: None,
                    target_post_id: None,
                    target_user_id: Some(target),
                    body: None,
                })
            }
            _ => None,
        }
    }

    fn random_body(&mut self) -> String {
        let nonce: u32 = self.rng.random();
        format!("post from {} #{nonce:08x}", self.user_id)
    }

    /// Deterministic `op_id` for one proposal: unique per `(agent, tick,
    /// sequence number within the tick)`, never per wall-clock or random
    /// draw, so the same run seed replays identical `op_id`s.
    pub fn op_id(&self, tick: u64, slot: u32) -> OpId {
        OpId::from(format!("{}-{tick}-{slot}", self.user_id))
    }
}
