use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::{Args, Parser, Subcommand, ValueEnum};
use feedsim_core::RankingAlgorithm;

/// Command line options for the feed simulator driver.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Global options that apply to all commands
    #[command(flatten)]
    pub global: GlobalOpts,

    /// The specific command to execute
    #[command(subcommand)]
    pub cmd: OptsCmd,
}

/// Global options that apply across all commands
#[derive(Debug, Args)]
pub struct GlobalOpts {
    #[arg(env = "FEEDSIM_DATA_DIR", long)]
    pub data_dir: Option<PathBuf>,
}

static PROJECT_DIRS: LazyLock<directories::ProjectDirs> = LazyLock::new(|| {
    directories::ProjectDirs::from("org", "Feedsim", "feedsim")
        .expect("Unable to determine project's dir")
});

impl GlobalOpts {
    pub fn data_dir(&self) -> &Path {
        self.data_dir
            .as_deref()
            .unwrap_or_else(|| PROJECT_DIRS.data_local_dir())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("feedsim.redb")
    }
}

/// Available commands for the feed simulator driver.
#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Create the event log and projection schema.
    InitDb {
        /// Drop and recreate tables even if the database already looks
        /// initialized.
        #[arg(long)]
        force: bool,
    },
    /// Run a deterministic simulation: agents act, tick by tick, against
    /// timelines built by the chosen ranking algorithm.
    Simulate {
        /// Number of ticks to advance through.
        #[arg(long)]
        ticks: u64,

        /// Number of agents to seed at the start of the run.
        #[arg(long)]
        agents: u32,

        /// Number of items each served timeline is truncated to.
        #[arg(long, default_value_t = 10)]
        k: u32,

        /// Ranking algorithm used for every timeline served this run.
        #[arg(long, value_enum, default_value = "hot")]
        ranking: RankingArg,

        /// Seed driving both agent behavior and ranker tie-breaking.
        #[arg(long)]
        seed: u64,
    },
    /// Truncate all projections and rebuild them from the event log.
    Replay,
    /// Compute read-only KPIs over current projection state.
    Kpis {
        /// Emit a single JSON object instead of a human-readable summary.
        #[arg(long)]
        json_output: bool,
    },
    /// List events from the log, most recent last.
    Events {
        /// Maximum number of events to print.
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Only show events of this kind (e.g. `action`, `timeline_served`).
        #[arg(long)]
        event_type: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RankingArg {
    New,
    Top,
    Hot,
}

impl From<RankingArg> for RankingAlgorithm {
    fn from(value: RankingArg) -> Self {
        match value {
            RankingArg::New => RankingAlgorithm::New,
            RankingArg::Top => RankingAlgorithm::Top,
            RankingArg::Hot => RankingAlgorithm::Hot,
        }
    }
}
