//! bsml
//!
//! Command-line interface for BioSignalML recording containers:
//! - Describe a recording
//! - Read a signal by sample range or time interval
//! - Generate a default config file

use anyhow::Context;
use biosignal_store::config::{generate_default_config, Config, LoggingConfig};
use biosignal_store::recording::Recording;
use biosignal_store::timeseries::TimeSeries;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used while the config is being loaded
const BOOTSTRAP_FILTER: &str = "biosignal_store=info,bsml=info";

#[derive(Parser)]
#[command(name = "bsml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect BioSignalML recording containers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the recording, its clocks and its signals
    Info {
        /// Container file
        file: PathBuf,
    },

    /// Print the samples of one signal
    Read {
        /// Container file
        file: PathBuf,
        /// Signal URI
        signal: String,
        /// Interval start (seconds)
        #[arg(short, long)]
        start: Option<f64>,
        /// Interval duration (seconds, default: to the end)
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Subscriber active until the configured one is installed
fn bootstrap_subscriber<W>(make_writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(BOOTSTRAP_FILTER))
        .with_writer(make_writer)
        .finish()
}

/// Load the config with a bootstrap subscriber in place so that events
/// raised while loading are not lost
fn load_config<W>(path: Option<&Path>, make_writer: W) -> anyhow::Result<Config>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing::subscriber::with_default(bootstrap_subscriber(make_writer), || match path {
        Some(path) => {
            let config = Config::load_with_env(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            tracing::info!("Loaded config from {:?}", path);
            Ok(config)
        }
        None => Ok(Config::load_default()),
    })
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "biosignal_store={level},bsml={level}",
            level = logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), std::io::stderr)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Info { file } => {
            let rec = Recording::open(&file, true, &config.store)
                .with_context(|| format!("Failed to open {:?}", file))?;
            print_info(&rec, &cli.format)?;
        }

        Commands::Read {
            file,
            signal,
            start,
            duration,
        } => {
            let rec = Recording::open(&file, true, &config.store)
                .with_context(|| format!("Failed to open {:?}", file))?;
            let sig = rec.get_signal(&signal)?;

            let series = match (start, duration) {
                (None, None) => sig.read(0, -1)?,
                (start, duration) => {
                    sig.read_interval(start.unwrap_or(0.0), duration.unwrap_or(f64::INFINITY))?
                }
            };
            print_series(&series, &cli.format)?;
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn print_info(rec: &Recording, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(rec.description())?);
        return Ok(());
    }

    println!("Recording: <{}>", rec.uri());
    println!("Format:    {}", rec.version()?);
    if let Some(label) = &rec.info().label {
        println!("Label:     {}", label);
    }
    if let Some(start) = rec.info().starttime {
        println!("Started:   {}", start.to_rfc3339());
    }

    println!();
    println!("Clocks ({}):", rec.get_clocks().len());
    for clock in rec.get_clocks() {
        match clock.rate() {
            Some(rate) => println!("  {}  {} Hz", clock.uri(), rate),
            None => println!("  {}  {} samples", clock.uri(), clock.size()?),
        }
    }

    println!();
    println!("Signals ({}):", rec.get_signals().len());
    for signal in rec.get_signals() {
        let timing = match (signal.rate(), signal.clock_uri()?) {
            (Some(rate), _) => format!("{} Hz", rate),
            (None, Some(clock)) => format!("clock <{}>", clock),
            (None, None) => "untimed".to_string(),
        };
        println!(
            "  {}  [{}]  {} samples, {}",
            signal.uri(),
            signal.units()?,
            signal.size()?,
            timing
        );
    }

    Ok(())
}

fn print_series(series: &TimeSeries, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let points: Vec<(f64, f64)> = series.points().collect();
            println!("{}", serde_json::to_string_pretty(&points)?);
        }
        "csv" => {
            println!("time,value");
            for (t, v) in series.points() {
                println!("{},{}", t, v);
            }
        }
        _ => {
            println!("{:>14}  {:>14}", "time", "value");
            for (t, v) in series.points() {
                println!("{:>14.6}  {:>14.6}", t, v);
            }
            println!();
            println!("{} samples", series.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_load_events_are_recorded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bsml.toml");
        std::fs::write(&path, generate_default_config()).unwrap();

        let captured = Captured::default();
        let sink = captured.clone();
        load_config(Some(&path), move || sink.clone()).unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Loaded config from"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml")), std::io::sink).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
