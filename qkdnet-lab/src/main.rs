use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use qkdnet_lab::config::{load_config, ConfigFormat, HardwareMode};
use qkdnet_lab::service::LabService;
use qkdnet_telemetry::TelemetryHandle;
use tracing_subscriber::EnvFilter;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!("Only one of the `dev`, `test`, or `prod` features may be enabled for qkdnet-lab.");

#[derive(Debug, Parser)]
#[command(
    name = "qkdnet-lab",
    version,
    about = "Runs BB84 key exchanges and one-time-pad messaging"
)]
struct Cli {
    /// Path to configuration file (TOML or YAML).
    #[arg(long, default_value = "configs/qkdnet-lab.toml")]
    config: PathBuf,
    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,
    /// Number of protocol runs to execute before exiting.
    #[arg(long, default_value_t = 1)]
    iterations: u32,
    /// Override the configured number of qubits per run.
    #[arg(long)]
    key_length: Option<u32>,
    /// Override the configured master seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Enable intercept-resend on the quantum channel.
    #[arg(long)]
    eve: bool,
    /// Enable bit flips on the classical ciphertext channel.
    #[arg(long)]
    classical_eve: bool,
    /// Override the hardware cross-check mode.
    #[arg(long, value_enum)]
    hardware: Option<HardwareMode>,
    /// Directory for per-run JSON artifacts.
    #[arg(long)]
    export_dir: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
    /// Print a sample configuration and exit.
    #[arg(long)]
    print_sample: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    if cli.print_sample {
        print!("{}", qkdnet_lab::config::Config::sample().to_toml()?);
        return Ok(());
    }
    init_tracing(cli.json_logs);

    let mut config = load_config(&cli.config, cli.config_format)?;
    if let Some(key_length) = cli.key_length {
        config.lab.key_length = key_length;
    }
    if cli.seed.is_some() {
        config.lab.seed = cli.seed;
    }
    config.lab.eavesdropper |= cli.eve;
    config.lab.classical_eavesdropper |= cli.classical_eve;
    if let Some(mode) = cli.hardware {
        config.hardware.mode = mode;
    }
    if cli.export_dir.is_some() {
        config.lab.export_dir = cli.export_dir.clone();
    }
    config.validate()?;

    let telemetry = TelemetryHandle::from_config(config.telemetry.clone());
    let mut service = LabService::new(&config, telemetry.clone())?;
    tracing::info!(
        seed = service.simulator().seed(),
        flush_interval_ms = telemetry.flush_interval(),
        "qkdnet-lab starting"
    );

    for iteration in 1..=cli.iterations {
        let report = service.run_iteration(iteration).await?;
        let verification = match &report.verification {
            None => "local".to_owned(),
            Some(v) if v.is_cross_checked() => "cross-checked".to_owned(),
            Some(_) => "local-only (fallback)".to_owned(),
        };
        println!(
            "run {} {} qber={:.3} sifted={} messages delivered={} tampered={} verification={}",
            iteration,
            report.status,
            report.qber,
            report.sifted_length,
            report.messages_delivered,
            report.messages_compromised,
            verification
        );
    }

    let snapshot = telemetry.flush();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
