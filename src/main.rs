use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use riskgate::config::{Config, ThresholdConfig};
use riskgate::core::presets;
use riskgate::core::{CandidateInput, GroundTruth, TransactionType};
use riskgate::db::{SharedDatabase, TransactionRecord, TransactionRepository};
use riskgate::rpc::PredictionClient;
use riskgate::{ScoringPipeline, Submission};

/// Risk scoring and step-up decisions for simulated payments.
#[derive(Parser)]
#[command(name = "riskgate")]
#[command(version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one transaction and record it.
    Score(ScoreArgs),
    /// Canned demo scenarios.
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// List recorded transactions, newest first.
    History(HistoryArgs),
    /// Attach a ground-truth label to a recorded transaction.
    Label(LabelArgs),
    /// Complete step-up verification for a STEP_UP transaction.
    Stepup(StepUpArgs),
    /// Show or change decision thresholds.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Decision and label counts over the transaction log.
    Summary(JsonArg),
    /// Recent settings and decision changes.
    Audit(LimitArg),
    /// Check the prediction service.
    Health,
}

#[derive(Args)]
struct JsonArg {
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LimitArg {
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args)]
struct ScoreArgs {
    /// PAYMENT, TRANSFER, CASH_OUT, CASH_IN or DEBIT.
    #[arg(short = 't', long = "type")]
    tx_type: TransactionType,

    #[arg(short, long)]
    amount: f64,

    /// Origin balance before the transaction.
    #[arg(short, long)]
    origin: f64,

    /// Destination balance before the transaction.
    #[arg(short, long, default_value_t = 0.0)]
    dest: f64,

    /// Simulation hour, 1..=744.
    #[arg(short, long, default_value_t = 1)]
    step: u32,

    /// Skip the insufficient-balance check.
    #[arg(long)]
    allow_overdraft: bool,

    #[command(flatten)]
    out: JsonArg,
}

#[derive(Subcommand)]
enum PresetAction {
    /// List available presets.
    List,
    /// Score one preset, or all of them.
    Run {
        /// Preset id. Omit to run every preset.
        id: Option<String>,

        #[command(flatten)]
        out: JsonArg,
    },
}

#[derive(Args)]
struct HistoryArgs {
    #[command(flatten)]
    limit: LimitArg,

    #[command(flatten)]
    out: JsonArg,
}

#[derive(Args)]
struct LabelArgs {
    id: i64,

    /// fraud or legit.
    label: GroundTruth,
}

#[derive(Args)]
struct StepUpArgs {
    id: i64,

    /// Code attempt, in entry order. Repeat for several attempts.
    #[arg(short, long = "code", required = true)]
    codes: Vec<String>,

    /// Seconds since the challenge was shown.
    #[arg(short, long, default_value_t = 0)]
    elapsed: u64,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the active thresholds.
    Show,
    /// Change one or more thresholds. Unset values are kept.
    Set(SettingsSetArgs),
}

#[derive(Args)]
struct SettingsSetArgs {
    #[arg(long)]
    approve: Option<f64>,
    #[arg(long)]
    block: Option<f64>,
    #[arg(long)]
    flag_threshold_amount: Option<f64>,
    #[arg(long)]
    high_risk_amount: Option<f64>,
    #[arg(long)]
    zero_out_min_amount: Option<f64>,
    #[arg(long)]
    new_dest_large_amount: Option<f64>,
    #[arg(long)]
    block_insufficient_balance: Option<bool>,
}

impl SettingsSetArgs {
    fn apply(&self, current: ThresholdConfig) -> ThresholdConfig {
        ThresholdConfig {
            approve_threshold: self.approve.unwrap_or(current.approve_threshold),
            block_threshold: self.block.unwrap_or(current.block_threshold),
            flag_threshold_amount: self.flag_threshold_amount.unwrap_or(current.flag_threshold_amount),
            high_risk_amount: self.high_risk_amount.unwrap_or(current.high_risk_amount),
            zero_out_min_amount: self.zero_out_min_amount.unwrap_or(current.zero_out_min_amount),
            new_dest_large_amount: self.new_dest_large_amount.unwrap_or(current.new_dest_large_amount),
            block_insufficient_balance: self
                .block_insufficient_balance
                .unwrap_or(current.block_insufficient_balance),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("riskgate=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config);
    tracing::debug!("Config: {:?}", config);

    if let Commands::Health = cli.command {
        return health(&config).await;
    }
    if let Commands::Preset { action: PresetAction::List } = cli.command {
        for p in presets::all() {
            println!("{:<20} {}", p.id, p.description);
        }
        return Ok(());
    }

    let db = open_database(Path::new(&config.database.path))?;
    let pipeline = ScoringPipeline::from_config(&config, db)?;

    match cli.command {
        Commands::Score(args) => {
            let input = CandidateInput {
                step: args.step,
                tx_type: args.tx_type,
                amount: args.amount,
                origin_balance_before: args.origin,
                dest_balance_before: args.dest,
                allow_overdraft: args.allow_overdraft,
            };
            let sub = pipeline.submit(&input).await?;
            print_submission(&sub, args.out.json)
        }
        Commands::Preset {
            action: PresetAction::Run { id, out },
        } => {
            let selected = match id {
                Some(id) => match presets::find(&id) {
                    Some(p) => vec![p],
                    None => bail!("unknown preset '{id}', see `riskgate preset list`"),
                },
                None => presets::all(),
            };
            for p in selected {
                let sub = pipeline
                    .submit(&p.input)
                    .await
                    .with_context(|| format!("preset {}", p.id))?;
                if !out.json {
                    println!("--- {} ---", p.id);
                }
                print_submission(&sub, out.json)?;
            }
            Ok(())
        }
        Commands::History(args) => {
            let mut records = pipeline.history()?;
            records.reverse();
            records.truncate(args.limit.limit);
            if args.out.json {
                return print_json(&records);
            }
            for r in &records {
                print_record(r);
            }
            Ok(())
        }
        Commands::Label(args) => {
            let record = pipeline.label(args.id, args.label)?;
            print_record(&record);
            Ok(())
        }
        Commands::Stepup(args) => {
            let record = pipeline.verify_step_up(args.id, &args.codes, Duration::from_secs(args.elapsed))?;
            print_record(&record);
            Ok(())
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => print_json(&pipeline.thresholds()),
            SettingsAction::Set(args) => {
                let next = args.apply(pipeline.thresholds());
                pipeline.update_thresholds(next)?;
                print_json(&pipeline.thresholds())
            }
        },
        Commands::Summary(out) => {
            let s = pipeline.summary()?;
            if out.json {
                return print_json(&s);
            }
            println!("Transactions:           {}", s.total);
            println!("  Approved:             {}", s.approved);
            println!("  Pending step-up:      {}", s.pending_step_up);
            println!("  Approved after step-up: {}", s.approved_after_step_up);
            println!("  Step-up failed:       {}", s.step_up_failed);
            println!("  Blocked:              {}", s.blocked);
            println!("Labeled:                {}", s.labeled);
            println!("  Fraud caught:         {}", s.fraud_caught);
            println!("  Fraud missed:         {}", s.fraud_missed);
            println!("  False alarms:         {}", s.false_alarms);
            Ok(())
        }
        Commands::Audit(args) => {
            for e in pipeline.repo().audit_log(args.limit)? {
                println!("{}  {:<20} {}", e.created_at.format("%Y-%m-%d %H:%M:%S"), e.action, e.detail);
            }
            Ok(())
        }
        Commands::Health | Commands::Preset { action: PresetAction::List } => Ok(()),
    }
}

fn open_database(path: &Path) -> Result<SharedDatabase> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    let db = SharedDatabase::open(path).with_context(|| format!("failed to open database {}", path.display()))?;
    tracing::info!("Transaction database opened at {}", path.display());
    Ok(db)
}

async fn health(config: &Config) -> Result<()> {
    let client = PredictionClient::from_config(&config.model)?;
    let status = client
        .health()
        .await
        .with_context(|| format!("prediction service at {} is not reachable", config.model.base_url))?;
    println!("status: {}", status.status);
    println!("models: {}", status.models_loaded.join(", "));
    if !config.model.enabled {
        println!("(model scoring is disabled in config)");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_submission(sub: &Submission, json: bool) -> Result<()> {
    if json {
        return print_json(sub);
    }
    let r = &sub.result;
    println!(
        "#{} {} {:.2}  score {:.2} ({})  -> {}",
        sub.id,
        sub.candidate.tx_type(),
        sub.candidate.amount(),
        r.risk_score,
        r.source.as_str(),
        r.decision
    );
    for reason in &r.reasons {
        println!("  - {reason}");
    }
    Ok(())
}

fn print_record(r: &TransactionRecord) {
    let label = r.ground_truth.map(|g| g.as_str()).unwrap_or("-");
    println!(
        "#{:<5} {}  {:<9} {:>14.2}  score {:.2}  {:<20} {}",
        r.id,
        r.created_at.format("%Y-%m-%d %H:%M:%S"),
        r.candidate.tx_type().as_str(),
        r.candidate.amount(),
        r.result.risk_score,
        r.decision.as_str(),
        label
    );
}
