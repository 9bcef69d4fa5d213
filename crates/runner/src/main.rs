#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use chrono::{FixedOffset, NaiveTime};
use clap::{Args, Parser, Subcommand};
use fleet_core::{CallerContext, OwnerId, RecordId, Role, RunnerRecord};
use fleet_runner::{
    CleanupScheduler, DailySchedule, FleetConfig, LifecycleError, RegisterRequest,
    RetentionPolicy, RunnerView,
};
use fleet_storage::{OwnerCreateRequest, OwnerPromotion, OwnerRow};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Manages CI runners registered with an external runner binary.
#[derive(Parser, Debug)]
#[command(name = "fleetd", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory holding the ownership database
    #[arg(long, global = true, env = "FLEET_STORAGE_DIR", default_value = ".runner-fleet")]
    storage_dir: PathBuf,

    /// Runner binary to drive
    #[arg(long, global = true, env = "FLEET_RUNNER_BIN", default_value = "gitlab-runner")]
    runner_bin: String,

    /// Executor passed to `register`
    #[arg(long, global = true, env = "FLEET_EXECUTOR", default_value = "shell")]
    executor: String,

    /// Per-invocation timeout for the runner binary, in seconds
    #[arg(long, global = true, env = "FLEET_COMMAND_TIMEOUT_S", default_value_t = 60)]
    command_timeout_s: u64,

    /// Runners older than this many months are swept
    #[arg(long, global = true, env = "FLEET_RETENTION_MONTHS", default_value_t = 1)]
    retention_months: u32,

    /// Daily cleanup time, HH:MM
    #[arg(
        long,
        global = true,
        env = "FLEET_CLEANUP_AT",
        default_value = "00:00",
        value_parser = parse_time_of_day
    )]
    cleanup_at: NaiveTime,

    /// Offset of the cleanup time from UTC, in minutes
    #[arg(
        long,
        global = true,
        env = "FLEET_CLEANUP_UTC_OFFSET_MIN",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    cleanup_utc_offset_min: i32,
}

#[derive(Args, Debug)]
struct CallerArgs {
    /// Id of the account issuing the request
    #[arg(long, env = "FLEET_CALLER_ID")]
    caller_id: i64,

    /// Role of the calling account (admin|user)
    #[arg(long, env = "FLEET_CALLER_ROLE", default_value = "user")]
    role: Role,
}

impl CallerArgs {
    fn context(&self) -> CallerContext {
        CallerContext::new(OwnerId::new(self.caller_id), self.role)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily cleanup scheduler until Ctrl-C or SIGTERM
    Serve {
        /// Also sweep once right after startup
        #[arg(long)]
        sweep_on_start: bool,
    },
    /// List runners visible to the caller with their live status
    List {
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Register a runner owned by the caller
    Register {
        #[command(flatten)]
        caller: CallerArgs,
        /// CI server URL
        #[arg(long)]
        url: String,
        /// One-time registration token issued by the CI server
        #[arg(long, env = "FLEET_REGISTRATION_TOKEN", hide_env_values = true)]
        registration_token: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Runner tag (repeatable, or comma-separated)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Unregister a runner and drop its record
    Delete {
        #[command(flatten)]
        caller: CallerArgs,
        /// Record id as shown by `list`
        record_id: i64,
    },
    /// Run one garbage-collection sweep now
    Gc,
    /// Manage owner accounts
    #[command(subcommand)]
    Owner(OwnerCommand),
}

#[derive(Subcommand, Debug)]
enum OwnerCommand {
    /// Create an account
    Add {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Promote an account to admin, creating it when missing
    Promote {
        #[arg(long)]
        username: String,
    },
}

fn parse_time_of_day(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|err| format!("expected HH:MM ({err})"))
}

impl GlobalArgs {
    fn config(&self) -> anyhow::Result<FleetConfig> {
        let offset = FixedOffset::east_opt(self.cleanup_utc_offset_min.saturating_mul(60))
            .with_context(|| {
                format!(
                    "cleanup utc offset out of range: {} minutes",
                    self.cleanup_utc_offset_min
                )
            })?;
        if self.command_timeout_s == 0 {
            bail!("command timeout must be at least one second");
        }
        Ok(FleetConfig {
            storage_dir: self.storage_dir.clone(),
            runner_program: self.runner_bin.clone(),
            executor: self.executor.clone(),
            command_timeout: Duration::from_secs(self.command_timeout_s),
            retention: RetentionPolicy::new(self.retention_months),
            cleanup: DailySchedule::new(self.cleanup_at, offset),
        })
    }
}

/// Exit status for requests the lifecycle declined (not found, forbidden, conflict, invalid
/// input), as opposed to failures of the runner binary or the store.
const EXIT_DECLINED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LifecycleError>() {
        Some(err) if err.is_declined() => EXIT_DECLINED,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.global.config()?;

    match cli.command {
        Command::Serve { sweep_on_start } => serve(&config, sweep_on_start).await,
        Command::List { caller } => {
            let service = config.open_service()?;
            let listing = service.list(caller.context()).await?;
            print_json(&json!({
                "live_state_available": listing.live_state_available,
                "runners": listing.runners.iter().map(runner_view_json).collect::<Vec<_>>(),
            }))
        }
        Command::Register {
            caller,
            url,
            registration_token,
            name,
            tags,
        } => {
            let service = config.open_service()?;
            let record = service
                .register(RegisterRequest {
                    owner_id: caller.context().caller_id,
                    endpoint_url: url,
                    registration_token,
                    display_name: name,
                    tags,
                })
                .await?;
            print_json(&record_json(&record))
        }
        Command::Delete { caller, record_id } => {
            let service = config.open_service()?;
            let record = service
                .delete(caller.context(), RecordId::new(record_id))
                .await?;
            print_json(&json!({ "deleted": record_json(&record) }))
        }
        Command::Gc => {
            let service = config.open_service()?;
            let report = service.gc_sweep().await?;
            print_json(&serde_json::to_value(&report)?)
        }
        Command::Owner(command) => owner(&config, command),
    }
}

async fn serve(config: &FleetConfig, sweep_on_start: bool) -> anyhow::Result<()> {
    let service = config
        .open_service()
        .with_context(|| format!("open store in {}", config.storage_dir.display()))?;
    let mut scheduler = CleanupScheduler::new(service, config.cleanup);
    scheduler.start();

    if sweep_on_start {
        match scheduler.run_now().await {
            Some(Ok(report)) => tracing::info!(
                deleted = report.deleted,
                failed = report.failed,
                "startup sweep done"
            ),
            Some(Err(err)) => tracing::error!(%err, "startup sweep failed"),
            None => {}
        }
    }

    shutdown_signal().await;
    scheduler.stop().await;
    Ok(())
}

fn owner(config: &FleetConfig, command: OwnerCommand) -> anyhow::Result<()> {
    let mut store = config.open_store()?;
    match command {
        OwnerCommand::Add { username, role } => {
            let owner = store.owner_create(OwnerCreateRequest { username, role })?;
            print_json(&json!({ "created": owner_json(&owner) }))
        }
        OwnerCommand::Promote { username } => match store.owner_promote_admin(&username)? {
            OwnerPromotion::Created(owner) => {
                print_json(&json!({ "created": owner_json(&owner) }))
            }
            OwnerPromotion::Promoted(owner) => {
                print_json(&json!({ "promoted": owner_json(&owner) }))
            }
        },
    }
}

fn record_json(record: &RunnerRecord) -> Value {
    json!({
        "id": record.id.get(),
        "owner_id": record.owner_id.get(),
        "token": record.token,
        "name": record.display_name,
        "url": record.endpoint_url,
        "created_at_ms": record.created_at_ms,
    })
}

fn runner_view_json(view: &RunnerView) -> Value {
    let mut value = record_json(&view.record);
    value["owner_username"] = json!(view.owner_username);
    value["status"] = json!(view.status.as_str());
    value
}

fn owner_json(owner: &OwnerRow) -> Value {
    json!({
        "id": owner.id.get(),
        "username": owner.username,
        "role": owner.role.as_str(),
        "created_at_ms": owner.created_at_ms,
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl-C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
