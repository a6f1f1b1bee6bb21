use std::sync::Arc;

use clap::{Parser, Subcommand};
use sprintkpi::{
    AssigneeOverride, JiraClient, KpiWeights, SprintKpi, SprintKpiReport, SyncOptions,
    TrackerConfig, TrackerSource, Unconfigured,
};

#[derive(Parser)]
#[command(name = "sprintkpi", about = "Per-assignee sprint KPIs from Jira")]
struct Cli {
    /// Database path (default: ~/.sprintkpi/sprintkpi.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl sprintkpi::SyncProgress for StderrProgress {
    fn on_entity_start(&self, entity_key: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Fetching {}...", index + 1, total, entity_key);
    }

    fn on_tasks_fetched(&self, _entity_key: &str, count: usize) {
        eprintln!("  Fetched {} issues", count);
    }

    fn on_entity_complete(&self, report: &sprintkpi::SyncReport) {
        eprintln!(
            "  Done: {} issues across {}/{} sprints",
            report.items_synced, report.sprints_completed, report.sprints_total
        );
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List projects visible to the configured account
    Projects {
        /// Bypass the cache
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List boards of a project
    Boards {
        /// Project key (e.g. ABC)
        project: String,
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// List sprints of a board
    Sprints {
        /// Board id or Jira board URL
        #[arg(value_name = "BOARD_ID_OR_URL")]
        board: String,
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Fetch every sprint of a board into the cache
    Sync {
        /// Board id or Jira board URL
        #[arg(value_name = "BOARD_ID_OR_URL")]
        board: String,
        #[arg(long)]
        refresh: bool,
    },
    /// Per-assignee KPI report for a sprint
    Report {
        /// Sprint id or Jira board URL with `?sprint=<id>`
        #[arg(value_name = "SPRINT_ID_OR_URL")]
        sprint: String,
        /// Board id or URL (taken from the sprint URL when omitted)
        #[arg(long, value_name = "BOARD_ID_OR_URL")]
        board: Option<String>,
        /// Refetch the sprint's issues and recompute
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Record QA rework and delays for an assignee
    Override {
        /// Sprint id or Jira board URL with `?sprint=<id>`
        #[arg(value_name = "SPRINT_ID_OR_URL")]
        sprint: String,
        /// Assignee display name
        assignee: String,
        /// Number of QA rework cycles
        #[arg(long, default_value = "0")]
        rework: u32,
        /// Delay in minutes
        #[arg(long, default_value = "0")]
        delays: f64,
    },
    /// Show or change KPI weights
    Weights {
        #[command(subcommand)]
        action: WeightsAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show cache status
    Status,
}

#[derive(Subcommand)]
enum WeightsAction {
    /// Print the current weights
    Show,
    /// Set all five weights (percentages; should sum to 100)
    Set {
        story_points: f64,
        tasks: f64,
        complexity: f64,
        rework: f64,
        delays: f64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn tracker_source() -> anyhow::Result<Arc<dyn TrackerSource>> {
    let source: Arc<dyn TrackerSource> = match TrackerConfig::from_env()? {
        Some(config) => Arc::new(JiraClient::new(config)?),
        None => {
            log::info!("Jira credentials not set; only cached data is available");
            Arc::new(Unconfigured)
        }
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => sprintkpi::Database::open_at(path).await?,
        None => sprintkpi::Database::open().await?,
    };
    let kpi = SprintKpi::new(db, tracker_source()?);

    match cli.command {
        Commands::Projects { refresh, json } => {
            let projects = kpi.projects(&SyncOptions { refresh }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for p in &projects {
                    println!("{:<12} {}", p.key, p.name);
                }
            }
        }
        Commands::Boards {
            project,
            refresh,
            json,
        } => {
            let boards = kpi.boards(&project, &SyncOptions { refresh }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&boards)?);
            } else {
                for b in &boards {
                    println!(
                        "{:<8} {:<8} {}",
                        b.id,
                        b.board_type.as_deref().unwrap_or("-"),
                        b.name
                    );
                }
            }
        }
        Commands::Sprints {
            board,
            refresh,
            json,
        } => {
            let sprints = kpi.sprints(&board, &SyncOptions { refresh }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sprints)?);
            } else {
                for s in &sprints {
                    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
                        d.map(|d| sprintkpi::date_util::date_key(&d))
                            .unwrap_or_else(|| "-".to_string())
                    };
                    println!(
                        "{:<8} {:<7} {:<10} {:<10} {}",
                        s.id,
                        s.state.as_str(),
                        date(s.start_date),
                        date(s.complete_date.or(s.end_date)),
                        s.name
                    );
                }
            }
        }
        Commands::Sync { board, refresh } => {
            let report = kpi
                .sync_board(&board, &SyncOptions { refresh }, &StderrProgress)
                .await?;
            if let Some(err) = &report.error {
                eprintln!("Warning: {err}");
            }
        }
        Commands::Report {
            sprint,
            board,
            refresh,
            json,
        } => {
            let sprint_id = sprintkpi::resolve_sprint_id(&sprint)?;
            let board_id = match &board {
                Some(b) => sprintkpi::resolve_board_id(b)?,
                None => sprintkpi::parse_jira_url(&sprint)
                    .map(|info| info.board_id)
                    .map_err(|_| anyhow::anyhow!("--board is required unless the sprint is given as a board URL"))?,
            };
            match kpi
                .sprint_report(sprint_id, board_id, &SyncOptions { refresh })
                .await?
            {
                Some(report) if json => println!("{}", serde_json::to_string_pretty(&report)?),
                Some(report) => print_report(&report),
                None => eprintln!("Sprint selection changed; report discarded."),
            }
        }
        Commands::Override {
            sprint,
            assignee,
            rework,
            delays,
        } => {
            let sprint_id = sprintkpi::resolve_sprint_id(&sprint)?;
            kpi.set_override(
                sprint_id,
                &assignee,
                AssigneeOverride {
                    qa_rework: rework,
                    delay_minutes: delays,
                },
            )
            .await?;
            println!("Override recorded for {assignee} in sprint {sprint_id}.");
        }
        Commands::Weights { action } => match action {
            WeightsAction::Show => print_weights(&kpi.weights().await?),
            WeightsAction::Set {
                story_points,
                tasks,
                complexity,
                rework,
                delays,
            } => {
                let weights = KpiWeights {
                    story_points,
                    tasks,
                    complexity,
                    rework,
                    delays,
                };
                kpi.set_weights(&weights).await?;
                print_weights(&weights);
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => match kpi.config_get(&key).await? {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            },
            ConfigAction::Set { key, value } => {
                kpi.config_set(&key, &value).await?;
                println!("Config updated.");
            }
            ConfigAction::List => {
                let items = kpi.config_list().await?;
                if items.is_empty() {
                    println!("No config values set.");
                }
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        },
        Commands::Status => {
            let status = kpi.status().await?;
            println!("Cache Status");
            println!("  Tiers:       {}", status.tiers.join(" -> "));
            for (prefix, count) in &status.entries {
                println!("  {:<12} {count}", format!("{prefix}:"));
            }
            println!(
                "  Last cached: {}",
                status.last_cached_at.unwrap_or_else(|| "never".to_string())
            );
        }
    }

    Ok(())
}

fn print_weights(weights: &KpiWeights) {
    println!("Story points: {}", weights.story_points);
    println!("Tasks:        {}", weights.tasks);
    println!("Complexity:   {}", weights.complexity);
    println!("Rework:       {}", weights.rework);
    println!("Delays:       {}", weights.delays);
    if !weights.is_valid() {
        eprintln!("Warning: weights sum to {} (must be 100)", weights.sum());
    }
}

fn print_report(report: &SprintKpiReport) {
    println!("{} (sprint {})", report.sprint_name, report.sprint_id);
    println!(
        "Targets: {:.1} story points, {:.1} tasks   Sprint quality: {}%",
        report.targets.story_points, report.targets.tasks, report.sprint_quality_pct
    );
    if !report.weights_valid {
        eprintln!(
            "Warning: weights sum to {} (must be 100); scores are not comparable",
            report.weights.sum()
        );
    }
    println!();
    println!(
        "{:<24} {:>5} {:>6} {:>6} {:>6} {:>7} {:>5}",
        "Assignee", "Tasks", "SP", "Cplx", "Rework", "Delay", "KPI"
    );
    for row in &report.rows {
        let s = &row.stat;
        println!(
            "{:<24} {:>5} {:>6.1} {:>6.2} {:>6} {:>7.0} {:>4}%",
            s.assignee, s.tasks, s.story_points, s.avg_complexity, s.qa_rework, s.delay_minutes, row.final_kpi
        );
    }
}
