mod report;
mod signal;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rtcsync_core::frame::two_wire;
use rtcsync_core::{
    capture_and_encode, list_ports, poll, run_flag, BridgeConfig, BusPirate, Direction, Error,
    LocalClock, PollConfig, PollOutcome, RtcDriver, StopSignal, ThreeWireBurst, TranscriptEntry,
    TwoWireAddressed,
};
use std::process::ExitCode;
use std::time::Duration;

use crate::report::{Format, Reporter};

/// Set a DS1302 or DS3231 real-time clock to the host's local time through a
/// Bus Pirate style USB serial bridge, then read it back once per interval.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports with their USB identity.
    List,
    /// DS1302 on a 3-wire bus (SPI mode 3, LSB first).
    Ds1302 {
        #[command(flatten)]
        session: SessionArgs,

        /// Clear the write-protect bit of the control register first.
        #[arg(long)]
        clear_write_protect: bool,
    },
    /// DS3231 on an I2C bus.
    Ds3231 {
        #[command(flatten)]
        session: SessionArgs,

        /// 7-bit device address, decimal or 0x-prefixed hex.
        #[arg(long, default_value = "0x68", value_parser = parse_address)]
        address: u8,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Serial device of the bridge, e.g. /dev/ttyUSB0 or COM3.
    #[arg(short, long)]
    port: String,

    /// Baud rate of the bridge's serial link.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Bus clock in Hz; defaults to the chip's usual rate.
    #[arg(long)]
    speed: Option<u32>,

    /// Milliseconds between polls.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Leave the RTC's time alone and only poll it.
    #[arg(long)]
    no_program: bool,

    /// Decode each frame into date, time and status.
    #[arg(long)]
    decode: bool,

    /// Prefix hex lines with the local time they were captured.
    #[arg(long)]
    timestamps: bool,

    #[arg(long, value_enum, default_value_t = Format::Hex)]
    format: Format,
}

impl SessionArgs {
    fn bridge_config(&self, mut cfg: BridgeConfig) -> BridgeConfig {
        cfg.baud_rate = self.baud;
        if let Some(speed) = self.speed {
            cfg.speed_hz = speed;
        }
        cfg
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    let address = parsed.map_err(|e| format!("invalid address {s:?}: {e}"))?;
    if address > 0x7F {
        return Err(format!("{s} is not a 7-bit address"));
    }
    Ok(address)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn open_bridge(cfg: BridgeConfig) -> Result<BusPirate> {
    let port = cfg.port_name.clone();
    BusPirate::open(cfg)
        .map_err(Error::BusOpen)
        .with_context(|| format!("cannot use bridge on {port}"))
}

fn list() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for p in ports {
        let mut line = p.port_name.clone();
        if let (Some(vid), Some(pid)) = (p.vid, p.pid) {
            line.push_str(&format!("  VID 0x{vid:04x} PID 0x{pid:04x}"));
        } else {
            line.push_str(&format!("  {}", p.port_type));
        }
        if let (Some(bus), Some(dev)) = (p.bus_number, p.device_number) {
            line.push_str(&format!("  bus {bus:03} device {dev:03}"));
        }
        if let Some(product) = p.product.as_deref().or(p.manufacturer.as_deref()) {
            line.push_str(&format!("  {product}"));
        }
        if let Some(serial) = &p.serial_number {
            line.push_str(&format!("  serial {serial}"));
        }
        println!("{line}");
    }
}

/// Programs the current time unless asked not to, then polls until stopped.
/// The driver is closed on every path; the first error is returned.
fn run_session<D, S, P>(rtc: &mut D, session: &SessionArgs, stop: &mut S, prepare: P) -> Result<()>
where
    D: RtcDriver,
    S: StopSignal,
    P: FnOnce(&mut D) -> Result<()>,
{
    let result = program_and_poll(rtc, session, stop, prepare);
    let closed = rtc.close().context("failed to close bridge");
    result.and(closed)?;
    info!("exiting");
    Ok(())
}

fn program_and_poll<D, S, P>(rtc: &mut D, session: &SessionArgs, stop: &mut S, prepare: P) -> Result<()>
where
    D: RtcDriver,
    S: StopSignal,
    P: FnOnce(&mut D) -> Result<()>,
{
    prepare(&mut *rtc)?;
    let reporter = Reporter::new(rtc.variant(), session.format, session.timestamps, session.decode);

    if !session.no_program {
        let frame = capture_and_encode(rtc.variant(), &mut LocalClock);
        info!("initializing time");
        reporter.emit(&TranscriptEntry::new(Direction::Tx, frame.as_bytes().to_vec()));
        rtc.program_time(&frame).context("failed to initialize time")?;
    }

    info!("reading time every {} ms (stop with Ctrl+C)", session.interval_ms);
    let outcome = poll(rtc, stop, &session.poll_config(), |regs| {
        reporter.emit(&TranscriptEntry::new(Direction::Rx, regs.to_vec()));
    });
    match &outcome {
        PollOutcome::Cancelled { polls } => info!("stopped after {polls} reads"),
        PollOutcome::Failed { polls, error } => {
            error!("polling stopped after {polls} reads: {error}")
        }
    }
    Ok(())
}

fn run(command: Command) -> Result<()> {
    if let Command::List = command {
        list();
        return Ok(());
    }

    let (handle, mut stop) = run_flag();
    signal::install(handle.clone())?;

    match command {
        Command::List => {}
        Command::Ds1302 {
            session,
            clear_write_protect,
        } => {
            let cfg = session.bridge_config(BridgeConfig::three_wire(&session.port));
            let mut rtc = ThreeWireBurst::new(open_bridge(cfg)?)?;
            run_session(&mut rtc, &session, &mut stop, |rtc| {
                if clear_write_protect {
                    let control = rtc.clear_write_protect().context("failed to clear write protect")?;
                    info!("control register now {control:02x}");
                }
                Ok(())
            })?;
        }
        Command::Ds3231 { session, address } => {
            let cfg = session.bridge_config(BridgeConfig::two_wire(&session.port));
            let mut rtc = TwoWireAddressed::new(open_bridge(cfg)?, address);
            if address != two_wire::DEFAULT_ADDRESS {
                info!("using device address 0x{address:02x}");
            }
            run_session(&mut rtc, &session, &mut stop, |_| Ok(()))?;
        }
    }
    drop(handle);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
