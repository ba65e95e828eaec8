//! Command line tool for a BNO055 on a serial port.
//!
//! Subcommands:
//! - `probe`: run the init sequence and report the result
//! - `stream`: init, then print corrected orientation samples
//! - `dump-config`: write the effective configuration as JSON

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bno055::{poller, Bno055, DriverConfig, OperatingMode, SerialPortTransport};
use clap::{Parser, Subcommand};
use tracing::info;

/// BNO055 orientation sensor tool
#[derive(Parser, Debug)]
#[command(name = "bno055_tool")]
#[command(about = "Probe and stream a BNO055 orientation sensor over UART")]
#[command(version)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device path
    #[arg(long, global = true)]
    port: Option<String>,

    /// UART baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Fusion mode (imu, compass, m4g, ndof-fmc-off, ndof)
    #[arg(long, global = true)]
    mode: Option<OperatingMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the sensor and exit
    Probe,

    /// Initialize and print orientation samples
    Stream {
        /// Number of samples to print (0 = until interrupted)
        #[arg(short, long, default_value = "0")]
        count: u64,

        /// Update interval in milliseconds (overrides the config file)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Zero both outputs after this many samples
        #[arg(long)]
        zero_after: Option<u64>,

        /// Print angles in degrees instead of radians
        #[arg(long)]
        degrees: bool,
    },

    /// Write the effective configuration as JSON
    DumpConfig {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Probe => cmd_probe(&config),
        Command::Stream {
            count,
            interval_ms,
            zero_after,
            degrees,
        } => {
            let mut config = config;
            if let Some(interval_ms) = interval_ms {
                config.poll_interval_ms = interval_ms;
            }
            cmd_stream(&config, count, zero_after, degrees)
        }
        Command::DumpConfig { output } => cmd_dump_config(&config, output),
    }
}

fn load_config(args: &Args) -> Result<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => DriverConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(mode) = args.mode {
        config.fusion_mode = mode;
    }

    if !config.fusion_mode.is_fusion() {
        bail!("{} is not a fusion mode", config.fusion_mode);
    }
    Ok(config)
}

fn open(config: &DriverConfig) -> Result<Bno055<SerialPortTransport>> {
    let transport = SerialPortTransport::open(&config.port, config.baud_rate)
        .with_context(|| format!("failed to open {}", config.port))?;

    let mut imu = Bno055::new(transport);
    config.apply(&mut imu);
    imu.init(config.init_timeout())
        .with_context(|| format!("BNO055 on {} did not initialize", config.port))?;
    Ok(imu)
}

fn cmd_probe(config: &DriverConfig) -> Result<()> {
    let mut imu = open(config)?;
    info!("BNO055 on {} is up in {} mode", config.port, imu.fusion_mode());

    imu.update().context("first orientation read failed")?;
    let (heading, roll, pitch) = imu.euler().to_degrees();
    println!(
        "heading {:7.2}°  roll {:7.2}°  pitch {:7.2}°",
        heading, roll, pitch
    );
    Ok(())
}

fn cmd_stream(
    config: &DriverConfig,
    count: u64,
    zero_after: Option<u64>,
    degrees: bool,
) -> Result<()> {
    let imu = open(config)?;
    let poller = poller::spawn(imu, config.poller_config());

    if config.poller_config().interval.is_none() {
        // No data-ready line on a bare serial port, so fall back to a timer
        let notifier = poller.notifier();
        std::thread::spawn(move || {
            while notifier.notify() {
                std::thread::sleep(Duration::from_millis(10));
            }
        });
    }

    let mut printed = 0u64;
    for sample in poller.samples().iter() {
        printed += 1;

        let euler = sample.orientation.euler;
        let q = sample.orientation.quaternion;
        let (x, y, z) = if degrees {
            euler.to_degrees()
        } else {
            (euler.x, euler.y, euler.z)
        };
        println!(
            "{:6} euler [{:8.4} {:8.4} {:8.4}] quat [{:7.4} {:7.4} {:7.4} {:7.4}]",
            sample.sequence, x, y, z, q.w, q.i, q.j, q.k
        );

        if zero_after == Some(printed) {
            info!("Zeroing orientation at sample {}", sample.sequence);
            poller.reset_euler_reference()?;
            poller.reset_quaternion_reference()?;
        }
        if count > 0 && printed >= count {
            break;
        }
    }

    poller.join()?;
    Ok(())
}

fn cmd_dump_config(config: &DriverConfig, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            config
                .save_to_file(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
