use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use promsnap::{CollectorConfig, CollectorSettings, MetricsCollector, SshAgent, TimeWindow};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "promsnap")]
#[command(about = "Collect a time-window trimmed Prometheus snapshot from a remote node", long_about = None)]
#[command(version)]
struct Args {
    /// Remote host to collect from
    #[arg(long, env = "PROMSNAP_HOST")]
    host: String,

    /// SSH user
    #[arg(short, long, env = "PROMSNAP_USER")]
    user: Option<String>,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    ssh_port: u16,

    /// SSH identity file
    #[arg(short, long, env = "PROMSNAP_IDENTITY")]
    identity: Option<PathBuf>,

    /// SSH connect timeout (e.g. "10s")
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// Output directory; the host name is appended
    #[arg(short, long, default_value = "collected")]
    output: PathBuf,

    /// Start of the window (RFC 3339, e.g. "2021-01-01T00:00:00Z")
    #[arg(long, value_parser = humantime::parse_rfc3339_weak)]
    from: Option<SystemTime>,

    /// End of the window (RFC 3339); defaults to now
    #[arg(long, value_parser = humantime::parse_rfc3339_weak)]
    to: Option<SystemTime>,

    /// Window length when --from is not given (e.g. "6h", "2days")
    #[arg(long, default_value = "1day", value_parser = humantime::parse_duration)]
    since: Duration,

    /// JSON settings file
    #[arg(long, env = "PROMSNAP_SETTINGS")]
    settings: Option<PathBuf>,

    /// Prometheus admin API port on the remote host
    #[arg(long)]
    prometheus_port: Option<u16>,

    /// Prometheus data path on the remote host
    #[arg(long)]
    data_path: Option<String>,

    /// Transfer the snapshot directory as-is instead of a tarball
    #[arg(long)]
    no_archive: bool,

    /// Gzip the tarball on the remote host
    #[arg(long)]
    gzip: bool,

    /// Unpack the retrieved tarball locally
    #[arg(long)]
    unpack: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "PROMSNAP_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn collector_settings(&self) -> anyhow::Result<CollectorSettings> {
        let mut settings = match &self.settings {
            Some(path) => CollectorSettings::from_json_file(path)?,
            None => CollectorSettings::default(),
        };
        if let Some(port) = self.prometheus_port {
            settings.prometheus.port = port;
        }
        if let Some(data_path) = &self.data_path {
            settings.prometheus.data_path = data_path.clone();
        }
        if self.no_archive {
            settings.copy_compressed = false;
        }
        settings.gzip |= self.gzip;
        settings.unpack |= self.unpack;
        Ok(settings)
    }

    fn window(&self) -> anyhow::Result<TimeWindow> {
        let to: DateTime<Utc> = self.to.unwrap_or_else(SystemTime::now).into();
        let from: DateTime<Utc> = match self.from {
            Some(from) => from.into(),
            None => {
                let since =
                    chrono::Duration::from_std(self.since).context("--since is too large")?;
                to.checked_sub_signed(since)
                    .context("--since reaches before the representable time range")?
            }
        };
        Ok(TimeWindow::new(from, to)?)
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt().with_env_filter(format!("promsnap={}", log_level));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json_logs);

    if args.host.trim().is_empty() {
        bail!("--host must not be empty");
    }

    let config = CollectorConfig {
        settings: args.collector_settings()?,
        window: args.window()?,
    };

    info!("Host: {}", args.host);
    info!("Window: {} .. {}", config.window.from, config.window.to);

    let destination = args.output.join(&args.host);
    std::fs::create_dir_all(&destination)
        .with_context(|| format!("creating {}", destination.display()))?;

    let agent = SshAgent {
        user: args.user.clone(),
        port: args.ssh_port,
        identity: args.identity.clone(),
        connect_timeout: args.connect_timeout,
        ..SshAgent::new(args.host.clone())
    };

    let collector = MetricsCollector::new(config, &destination);
    match collector.collect(&agent).await {
        Ok(report) => {
            let report_path = destination.join("collection.json");
            std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
            info!("Persisted collection report to {}", report_path.display());
            Ok(())
        }
        Err(e) => {
            error!("Metrics collection failed: {}", e);
            Err(e.into())
        }
    }
}
