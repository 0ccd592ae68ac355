use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use hostpath_allocator::MountRoot;
use hostpath_reclaimer::{
    preflight, DirectoryReclaimer, OsHostFs, OutputFormat, Printer, ReclaimerConfig,
    ReclaimerService,
};
use hostpath_types::SystemClock;

/// FUSE sidecar host-path reclaimer
///
/// Removes empty, unmounted, sufficiently old `<dataset>-fuse-mount`
/// directories left behind under the allocated host-path tree. Only empty
/// directories are ever removed.
#[derive(Parser, Debug)]
#[command(name = "hostpath-reclaimer", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory holding PodIdentity directories
    #[arg(long, conflicts_with = "runtime_type")]
    base_dir: Option<PathBuf>,

    /// Derive the base directory as `$MOUNT_ROOT/<runtime-type>`
    #[arg(long)]
    runtime_type: Option<String>,

    /// Minimum number of AllocationId directories before anything is deleted
    #[arg(long)]
    threshold: Option<usize>,

    /// Minimum age in whole days before a directory may be deleted
    #[arg(long)]
    age_days: Option<u64>,

    /// Evaluate every gate but delete nothing
    #[arg(long)]
    dry_run: bool,

    /// Seconds between runs; 0 runs once and exits
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Output format (table or json)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Skip the root check (testing only)
    #[arg(long)]
    allow_unprivileged: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ReclaimerConfig) {
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(runtime_type) = &self.runtime_type {
            config.base_dir = MountRoot::from_env().base_path(runtime_type);
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(age_days) = self.age_days {
            config.age_days = age_days;
        }
        if let Some(interval_secs) = self.interval_secs {
            config.interval_secs = interval_secs;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.allow_unprivileged {
            config.require_privilege = false;
        }
        config.log = config.log.clone().with_verbose(self.verbose);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", ReclaimerConfig::default().to_toml()?);
        return Ok(());
    }

    let mut printer = Printer::stdout(args.format);
    if let Err(e) = run(&args, &mut printer).await {
        printer.print_error(&format!("{:#}", e))?;
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args, printer: &mut Printer) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ReclaimerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ReclaimerConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let _guard = hostpath_logging::init_logging(&config.log)?;

    tracing::info!(
        base_dir = %config.base_dir.display(),
        threshold = config.threshold,
        age_days = config.age_days,
        dry_run = config.dry_run,
        interval_secs = config.interval_secs,
        "Starting hostpath reclaimer"
    );

    preflight(&OsHostFs, &config).context("preflight failed")?;

    let interval = config.interval();
    let service = ReclaimerService::new(DirectoryReclaimer::new(OsHostFs, SystemClock, config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut print_failed = None;
    service
        .run_periodic(interval, shutdown_rx, |report| {
            if let Err(e) = printer.print_report(report) {
                print_failed.get_or_insert(e);
            }
        })
        .await?;
    signal.abort();

    if let Some(e) = print_failed {
        return Err(e).context("writing report");
    }
    Ok(())
}

/// Wait for CTRL+C or SIGTERM. Never resolves if neither can be registered.
async fn wait_for_shutdown_signal() {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received CTRL+C");
                return;
            }
        };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => { tracing::info!("Received CTRL+C"); }
        _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
    }
}
