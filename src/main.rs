use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use logsift_logs::{
    BlockingPool, FileLogDataSource, Log, LogList, LogReader, LogReaderState, LogsChange,
    ReaderConfig, ReaderContext, ReaderEvent, ReaderProperty,
};

mod profile;

use profile::LogProfile;

/// logsift - Read log files into structured logs with regex profiles
#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log file to read
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Log profile (TOML) describing how lines become logs
    #[arg(long, short)]
    profile: PathBuf,

    /// Keep reading as the file grows
    #[arg(long, short)]
    follow: bool,

    /// Keep at most this many logs
    #[arg(long)]
    max_logs: Option<usize>,

    /// Reader tunables (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let profile = LogProfile::load(&args.profile)?;
    let config = match &args.config {
        Some(path) => ReaderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    let mut options = profile.reading_options()?;
    options.is_continuous |= args.follow;
    let mut source = FileLogDataSource::new(&args.file);
    if options.is_continuous {
        source = source.follow();
    }

    let context = ReaderContext::new(config).with_task_spawner(Arc::new(BlockingPool::current()));
    let reader = LogReader::new(Arc::new(source), &context);
    reader.configure(options).await?;
    reader
        .set_max_log_count(args.max_logs.or(profile.max_log_count))
        .await?;
    if let Some(delay) = profile.restart_reading_delay_ms {
        reader
            .set_restart_reading_delay(Duration::from_millis(delay))
            .await?;
    }

    let mut events = reader.subscribe();
    reader.start().await?;

    let mut printer = Printer::default();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(ReaderEvent::LogsChanged(LogsChange::Appended { .. })) => {
                        printer.print_new(reader.logs(), &mut io::stdout().lock())?;
                    }
                    Ok(ReaderEvent::PropertyChanged(ReaderProperty::State)) => {
                        if is_finished(reader.state()) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "reader events dropped, catching up");
                        printer.print_new(reader.logs(), &mut io::stdout().lock())?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                reader.stop().await?;
                break;
            }
        }
    }

    printer.print_new(reader.logs(), &mut io::stdout().lock())?;
    print_summary(reader.logs())?;

    let state = reader.state();
    reader.dispose().await;
    if state.is_error() {
        anyhow::bail!("Reading {} failed: {}", args.file.display(), state);
    }
    Ok(())
}

fn is_finished(state: LogReaderState) -> bool {
    matches!(
        state,
        LogReaderState::Stopped | LogReaderState::DataSourceError | LogReaderState::UnclassifiedError
    )
}

/// Writes logs to stdout, each one once
#[derive(Default)]
struct Printer {
    last_id: Option<u64>,
}

impl Printer {
    /// Print every log appended since the last call
    fn print_new(&mut self, logs: &LogList, out: &mut impl Write) -> Result<usize> {
        let new = logs.newer_than(self.last_id);
        for log in &new {
            writeln!(out, "{}", format_log(log))?;
            self.last_id = Some(log.id());
        }
        Ok(new.len())
    }
}

/// `timestamp LEVEL source: message`, continuation lines indented
fn format_log(log: &Log) -> String {
    let timestamp = log
        .timestamp()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string());
    let level = log.level().unwrap_or_default().abbreviation();
    let source = log.source_name().or_else(|| log.process_name());
    let message = log.message().unwrap_or_default().replace('\n', "\n    ");
    match source {
        Some(source) => format!("{} {} {}: {}", timestamp, level, source, message),
        None => format!("{} {} {}", timestamp, level, message),
    }
}

fn print_summary(logs: &LogList) -> Result<()> {
    let counts = logs.level_counts();
    let levels: Vec<String> = counts
        .iter()
        .map(|(level, count)| format!("{} {}", level, count))
        .collect();
    let mut out = io::stdout().lock();
    writeln!(out)?;
    writeln!(out, "{} logs ({})", counts.total(), levels.join(", "))?;
    Ok(())
}
