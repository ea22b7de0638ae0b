//! `petkit` command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use petkit_engine::{Control, DeviceRegistry};
use petkit_protocol::{lookup_model, FountainMode, Switch};
use petkit_runner::{
    build_device, open_adapter, open_transport, run_poll, scan, DiscoveredDevice, PollOptions,
    RunnerConfig, RunnerResult,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Talk to Petkit smart fountains over Bluetooth LE.
#[derive(Parser, Debug)]
#[command(name = "petkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Device address, overriding the config file.
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Talk to a simulated fountain instead of Bluetooth.
    #[arg(long, global = true)]
    simulate: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List nearby devices and identify fountains.
    Scan {
        /// Scan duration in seconds.
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Include devices that are not fountains.
        #[arg(long)]
        all: bool,
    },
    /// Run one fetch cycle and print the telemetry as JSON.
    Fetch,
    /// Fetch repeatedly, one JSON line per cycle.
    Poll {
        /// Seconds between cycles, overriding the config file.
        #[arg(short, long)]
        interval: Option<u64>,
        /// Stop after this many cycles.
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
    /// Change a setting.
    Set {
        #[command(subcommand)]
        setting: Setting,
    },
}

#[derive(Subcommand, Debug)]
enum Setting {
    /// Turn the pump on or off.
    Power { state: OnOff },
    /// Switch between smart and normal pumping.
    Mode { mode: ModeArg },
    /// Enable or disable do-not-disturb.
    Dnd { state: OnOff },
    /// Reset the filter life counter.
    ResetFilter,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnOff {
    On,
    Off,
}

impl From<OnOff> for Switch {
    fn from(value: OnOff) -> Self {
        match value {
            OnOff::On => Switch::On,
            OnOff::Off => Switch::Off,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Smart,
    Normal,
}

impl From<ModeArg> for FountainMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Smart => FountainMode::Smart,
            ModeArg::Normal => FountainMode::Normal,
        }
    }
}

impl Setting {
    fn to_control(&self) -> Control {
        match self {
            Setting::Power { state } => Control::Power((*state).into()),
            Setting::Mode { mode } => Control::Mode((*mode).into()),
            Setting::Dnd { state } => Control::DoNotDisturb((*state).into()),
            Setting::ResetFilter => Control::ResetFilter,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    petkit_metrics::describe_metrics();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> RunnerResult<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(address) = &cli.address {
        config = config.with_address(address.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> RunnerResult<()> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Scan { duration, all } => {
            run_scan(&config, cli.simulate, Duration::from_secs(*duration), *all).await
        }
        Command::Fetch => run_fetch(&config, cli.simulate).await,
        Command::Poll { interval, count } => {
            let mut options = PollOptions::new(
                interval
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.poll_interval()),
            );
            if let Some(count) = count {
                options = options.with_max_cycles(*count);
            }
            run_poll_command(&config, cli.simulate, options).await
        }
        Command::Set { setting } => run_set(&config, cli.simulate, setting.to_control()).await,
    }
}

async fn run_scan(
    config: &RunnerConfig,
    simulate: bool,
    duration: Duration,
    all: bool,
) -> RunnerResult<()> {
    let devices = if simulate {
        vec![DiscoveredDevice {
            address: "00:00:00:00:00:00".to_string(),
            name: Some("Petkit_W5".to_string()),
            rssi: Some(-60),
            model: lookup_model(206),
        }]
    } else {
        let adapter = open_adapter(config.adapter_index).await?;
        scan(&adapter, duration).await?
    };

    let shown: Vec<&DiscoveredDevice> = devices
        .iter()
        .filter(|d| all || d.is_fountain())
        .collect();
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

async fn run_fetch(config: &RunnerConfig, simulate: bool) -> RunnerResult<()> {
    let transport = open_transport(config, simulate).await?;
    let mut device = build_device(&DeviceRegistry::with_defaults(), config, transport)?;

    let result = device.fetch_telemetry().await;
    device.release().await;
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_poll_command(
    config: &RunnerConfig,
    simulate: bool,
    options: PollOptions,
) -> RunnerResult<()> {
    let transport = open_transport(config, simulate).await?;
    let mut device = build_device(&DeviceRegistry::with_defaults(), config, transport)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Runner: cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    run_poll(device.as_mut(), options, shutdown, |_, result| {
        if let Ok(telemetry) = result {
            match serde_json::to_string(telemetry) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Runner: failed to encode telemetry: {}", e),
            }
        }
    })
    .await;
    Ok(())
}

async fn run_set(config: &RunnerConfig, simulate: bool, control: Control) -> RunnerResult<()> {
    let transport = open_transport(config, simulate).await?;
    let mut device = build_device(&DeviceRegistry::with_defaults(), config, transport)?;

    let result = device.control(control).await;
    device.release().await;
    result?;
    println!("{} applied", control.name());
    Ok(())
}
