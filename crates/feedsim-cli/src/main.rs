mod cli;
mod policy;

use std::io;
use std::path::Path;

use clap::Parser;
use cli::OptsCmd;
use feedsim_core::{EventKind, RankingAlgorithm};
use feedsim_db::{ActOutcome, ActRequest, DbError, Store};
use feedsim_util::FmtCompact as _;
use policy::Agent;
use snafu::{FromString, ResultExt, Snafu, Whatever};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "feedsim::cli";

type WhateverResult<T> = std::result::Result<T, Whatever>;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("database error: {source}"))]
    Database { source: DbError },
    #[snafu(display("could not create data directory {}: {source}", path.display()))]
    DataDir { path: std::path::PathBuf, source: io::Error },
    #[snafu(display("{source}"))]
    Whatever { source: Whatever },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;

    let opts = cli::Opts::parse();
    let value = handle_cmd(opts).await?;
    println!("{}", serde_json::to_string_pretty(&value).expect("JSON values never fail to serialize"));
    Ok(())
}

async fn handle_cmd(opts: cli::Opts) -> CliResult<serde_json::Value> {
    let data_dir = opts.global.data_dir();
    std::fs::create_dir_all(data_dir).context(DataDirSnafu { path: data_dir.to_owned() })?;
    let db_path = opts.global.db_path();

    Ok(match opts.cmd {
        OptsCmd::InitDb { force } => {
            let store = open_store(&db_path).await?;
            store.init(force).await.context(DatabaseSnafu)?;
            serde_json::json!({ "data_dir": data_dir, "db_path": db_path, "initialized": true })
        }
        OptsCmd::Simulate { ticks, agents, k, ranking, seed } => {
            let store = open_store(&db_path).await?;
            store.init(false).await.or_else(|err| match err {
                DbError::AlreadyInitialized { .. } => {
                    debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Database already initialized, reusing it");
                    Ok(())
                }
                other => Err(other),
            }).context(DatabaseSnafu)?;

            let algorithm: RankingAlgorithm = ranking.into();
            run_simulation(&store, ticks, agents, k, algorithm, seed).await?
        }
        OptsCmd::Replay => {
            let store = open_store(&db_path).await?;
            feedsim_db::replay_all(&store).await.context(DatabaseSnafu)?;
            let digest = feedsim_db::projection_digest(&store).await.context(DatabaseSnafu)?;
            let current_tick = store.current_tick().await.context(DatabaseSnafu)?;
            serde_json::json!({ "replayed": true, "current_tick": current_tick.0, "projection_digest": digest })
        }
        OptsCmd::Kpis { json_output } => {
            let store = open_store(&db_path).await?;
            let gini = feedsim_db::up_votes_gini(&store).await.context(DatabaseSnafu)?;
            let entropy = feedsim_db::author_entropy(&store).await.context(DatabaseSnafu)?;
            if json_output {
                serde_json::json!({ "up_votes_gini": gini, "author_entropy_bits": entropy })
            } else {
                serde_json::json!({
                    "up_votes_gini": format!("{gini:.4}"),
                    "author_entropy_bits": format!("{entropy:.4}"),
                })
            }
        }
        OptsCmd::Events { limit, event_type } => {
            let store = open_store(&db_path).await?;
            let wanted = event_type.as_deref().map(parse_event_kind);
            if let Some(None) = wanted {
                return Ok(serde_json::json!({ "error": "unknown event type" }));
            }
            let wanted = wanted.flatten();

            let events = store.scan(feedsim_core::Seq(0)).await.context(DatabaseSnafu)?;
            let rows: Vec<_> = events
                .into_iter()
                .filter(|e| wanted.is_none_or(|w| e.kind == w))
                .rev()
                .take(limit)
                .rev()
                .map(|e| {
                    let payload: serde_json::Value =
                        serde_json::from_str(&e.payload).unwrap_or(serde_json::Value::String(e.payload.clone()));
                    serde_json::json!({
                        "seq": e.seq.0,
                        "tick": e.tick.0,
                        "kind": e.kind,
                        "payload": payload,
                    })
                })
                .collect();
            serde_json::json!({ "events": rows })
        }
    })
}

async fn open_store(db_path: &Path) -> CliResult<Store> {
    Store::open(db_path.to_owned()).await.context(DatabaseSnafu)
}

fn parse_event_kind(s: &str) -> Option<EventKind> {
    match s {
        "run_started" => Some(EventKind::RunStarted),
        "run_config" => Some(EventKind::RunConfig),
        "advance_tick" => Some(EventKind::AdvanceTick),
        "timeline_served" => Some(EventKind::TimelineServed),
        "action" => Some(EventKind::Action),
        _ => None,
    }
}

/// Drives `ticks` rounds of: serve a timeline to every agent (in a seeded
/// permutation order), let the agent propose at most one action, submit it
/// through `act()`, then advance the clock once per tick.
async fn run_simulation(
    store: &Store,
    ticks: u64,
    agents: u32,
    k: u32,
    algorithm: RankingAlgorithm,
    seed: u64,
) -> CliResult<serde_json::Value> {
    let run_id = feedsim_db::start_run(store, seed, agents, algorithm, k, ticks).await.context(DatabaseSnafu)?;

    let mut pool: Vec<Agent> = (0..agents).map(|i| Agent::new(seed, i)).collect();
    let user_ids: Vec<_> = pool.iter().map(|a| a.user_id).collect();

    let mut accepted = 0u64;
    let mut rejected = 0u64;

    for tick in 0..ticks {
        let order = tick_permutation(seed, tick, agents);

        for (slot, &agent_idx) in order.iter().enumerate() {
            let agent = &mut pool[agent_idx as usize];

            let (timeline_id, items) = feedsim_db::timeline(store, run_id, agent.user_id, algorithm, k, seed)
                .await
                .context(DatabaseSnafu)?;

            let peers: Vec<_> = user_ids.iter().copied().filter(|&u| u != agent.user_id).collect();
            let Some(proposal) = agent.propose(timeline_id, &items, &peers) else {
                continue;
            };

            let op_id = agent.op_id(tick, slot as u32);
            let outcome = feedsim_db::act(
                store,
                feedsim_core::Tick(tick),
                ActRequest {
                    op_id,
                    actor_id: agent.user_id,
                    action_type: proposal.action_type,
                    timeline_id: proposal.timeline_id,
                    position: proposal.position,
                    target_post_id: proposal.target_post_id,
                    target_user_id: proposal.target_user_id,
                    body: proposal.body,
                },
            )
            .await
            .context(DatabaseSnafu)?;

            count_outcome(outcome, &mut accepted, &mut rejected);
        }

        feedsim_db::advance_tick(store).await.context(DatabaseSnafu)?;
        debug!(target: LOG_TARGET, tick, accepted, rejected, "Tick complete");
    }

    let final_tick = store.current_tick().await.context(DatabaseSnafu)?;
    info!(target: LOG_TARGET, %run_id, ticks, agents, accepted, rejected, "Simulation complete");

    Ok(serde_json::json!({
        "run_id": run_id.0,
        "seed": seed,
        "ticks": ticks,
        "agents": agents,
        "final_tick": final_tick.0,
        "accepted_actions": accepted,
        "rejected_actions": rejected,
    }))
}

fn count_outcome(outcome: ActOutcome, accepted: &mut u64, rejected: &mut u64) {
    if outcome.accepted() {
        *accepted += 1;
    } else {
        *rejected += 1;
    }
}

/// Seeded Fisher-Yates permutation of `0..agents`, reseeded every tick from
/// `(seed, tick)` so agent processing order is deterministic but varies tick
/// to tick.
fn tick_permutation(seed: u64, tick: u64, agents: u32) -> Vec<u32> {
    use rand::seq::SliceRandom as _;
    use rand::SeedableRng as _;

    let mut order: Vec<u32> = (0..agents).collect();
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed ^ tick.wrapping_mul(0xA24B_AED4_963E_E407));
    order.shuffle(&mut rng);
    order
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}
