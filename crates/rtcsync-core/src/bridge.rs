//! Bus Pirate style USB serial bridge and serial port enumeration.
//!
//! The bridge is driven in its binary bit-bang mode: a handful of one-byte
//! commands for chip select, start/stop conditions, single byte reads and
//! bulk transfers of up to 16 bytes. Almost every command is answered with
//! `0x01`.

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort, SerialPortInfo};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::bus::{Ack, BitOrder, BusMode, BusPrimitives, IdleLevel};
use crate::error::BusError;

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub port_name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub bus_number: Option<u16>,
    pub device_number: Option<u16>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (port_type, vid, pid, serial_number, manufacturer, product) = match &info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                "USB".to_string(),
                Some(usb.vid),
                Some(usb.pid),
                usb.serial_number.clone(),
                usb.manufacturer.clone(),
                usb.product.clone(),
            ),
            serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
            serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None, None, None),
            serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None, None, None, None),
        };
        let (bus_number, device_number) = if vid.is_some() {
            usb_location(&info.port_name).unzip()
        } else {
            (None, None)
        };
        Self {
            port_name: info.port_name,
            port_type,
            vid,
            pid,
            serial_number,
            manufacturer,
            product,
            bus_number,
            device_number,
        }
    }
}

/// Lists every serial port the OS reports. Never fails; an enumeration
/// error is logged and yields an empty list.
pub fn list_ports() -> Vec<PortInfo> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            warn!("serial port enumeration failed: {e}");
            Vec::new()
        }
    }
}

/// Walks up from the tty's sysfs device to the USB device that owns it.
#[cfg(target_os = "linux")]
fn usb_location(port_name: &str) -> Option<(u16, u16)> {
    let name = std::path::Path::new(port_name).file_name()?.to_str()?;
    let mut dir = std::fs::canonicalize(format!("/sys/class/tty/{name}/device")).ok()?;
    loop {
        let busnum = std::fs::read_to_string(dir.join("busnum"));
        let devnum = std::fs::read_to_string(dir.join("devnum"));
        if let (Ok(bus), Ok(dev)) = (busnum, devnum) {
            return Some((bus.trim().parse().ok()?, dev.trim().parse().ok()?));
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn usb_location(_port_name: &str) -> Option<(u16, u16)> {
    None
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
    pub timeout: Duration,
    pub mode: BusMode,
    /// Requested bus clock; rounded down to the nearest rate the bridge has.
    pub speed_hz: u32,
    pub bit_order: BitOrder,
    pub power: bool,
    pub pullups: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            data_bits: serialport::DataBits::Eight,
            parity: serialport::Parity::None,
            stop_bits: serialport::StopBits::One,
            flow_control: serialport::FlowControl::None,
            timeout: Duration::from_millis(500),
            mode: BusMode::I2c,
            speed_hz: 400_000,
            bit_order: BitOrder::MsbFirst,
            power: true,
            pullups: true,
        }
    }
}

impl BridgeConfig {
    /// SPI mode 3, 1 MHz, LSB first: what a DS1302 expects.
    pub fn three_wire(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            mode: BusMode::Spi(3),
            speed_hz: 1_000_000,
            bit_order: BitOrder::LsbFirst,
            pullups: false,
            ..Default::default()
        }
    }

    /// I2C at 400 kHz with pull-ups: what a DS3231 module expects.
    pub fn two_wire(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }
}

mod cmd {
    pub const RESET_BITBANG: u8 = 0x00;
    pub const ENTER_SPI: u8 = 0x01;
    pub const ENTER_I2C: u8 = 0x02;
    pub const RESET_TERMINAL: u8 = 0x0F;

    pub const SPI_CS_LOW: u8 = 0x02;
    pub const SPI_CS_HIGH: u8 = 0x03;

    pub const I2C_START: u8 = 0x02;
    pub const I2C_STOP: u8 = 0x03;
    pub const I2C_READ: u8 = 0x04;
    pub const I2C_ACK: u8 = 0x06;
    pub const I2C_NACK: u8 = 0x07;

    pub const BULK: u8 = 0x10;
    pub const PERIPHERALS: u8 = 0x40;
    pub const SPEED: u8 = 0x60;
    pub const SPI_CONFIG: u8 = 0x80;

    pub const OK: u8 = 0x01;
}

const RAW_MODE_ATTEMPTS: usize = 20;
const BULK_MAX: usize = 16;

const I2C_SPEEDS: [u32; 4] = [5_000, 50_000, 100_000, 400_000];
const SPI_SPEEDS: [u32; 8] = [
    30_000, 125_000, 250_000, 1_000_000, 2_000_000, 2_600_000, 4_000_000, 8_000_000,
];

/// Index of the fastest rate not above `hz`, or the slowest rate.
fn speed_code(rates: &[u32], hz: u32) -> u8 {
    rates.iter().rposition(|&r| r <= hz).unwrap_or(0) as u8
}

/// `1000wxyz`: w push-pull 3.3V output, x clock idle high, y data changes
/// on the active-to-idle edge, z sample at the middle.
fn spi_config_byte(spi_mode: u8) -> u8 {
    let cpol = (spi_mode >> 1) & 1;
    let cpha = spi_mode & 1;
    cmd::SPI_CONFIG | 0b1000 | (cpol << 2) | ((cpha ^ 1) << 1)
}

fn peripherals_byte(power: bool, pullups: bool) -> u8 {
    // chip select is released (high) until an idle level is configured
    cmd::PERIPHERALS | ((power as u8) << 3) | ((pullups as u8) << 2) | 1
}

pub struct BusPirate {
    port: Option<Box<dyn SerialPort>>,
    cfg: BridgeConfig,
    idle: IdleLevel,
    ack_mode: Ack,
    last_ack: Ack,
    last_error: Option<String>,
}

impl BusPirate {
    /// Opens the serial port and walks the bridge into the configured bus
    /// mode. The port is released again if any step fails.
    pub fn open(cfg: BridgeConfig) -> Result<Self, BusError> {
        let port = serialport::new(&cfg.port_name, cfg.baud_rate)
            .data_bits(cfg.data_bits)
            .parity(cfg.parity)
            .stop_bits(cfg.stop_bits)
            .flow_control(cfg.flow_control)
            .timeout(cfg.timeout)
            .open()?;

        let mut bridge = Self {
            port: Some(port),
            cfg,
            idle: IdleLevel::High,
            ack_mode: Ack::Ack,
            last_ack: Ack::Ack,
            last_error: None,
        };
        bridge.enter_raw_mode()?;
        bridge.enter_bus_mode()?;
        bridge.configure()?;
        info!(
            "{} bridge on {} ready ({} Hz requested)",
            bridge.cfg.mode.name(),
            bridge.cfg.port_name,
            bridge.cfg.speed_hz
        );
        Ok(bridge)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.cfg
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, BusError> {
        self.port.as_mut().ok_or(BusError::Closed)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.port()?.write_all(bytes)?;
        Ok(())
    }

    fn receive(&mut self, count: usize) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; count];
        match self.port()?.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(BusError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn command(&mut self, command: u8) -> Result<(), BusError> {
        self.send(&[command])?;
        let reply = self.receive(1)?[0];
        if reply != cmd::OK {
            return Err(BusError::Rejected { command, reply });
        }
        Ok(())
    }

    fn enter_raw_mode(&mut self) -> Result<(), BusError> {
        let port = self.port()?;
        port.clear(ClearBuffer::Input)?;
        let mut seen = Vec::new();
        for _ in 0..RAW_MODE_ATTEMPTS {
            port.write_all(&[cmd::RESET_BITBANG])?;
            std::thread::sleep(Duration::from_millis(10));
            let pending = port.bytes_to_read()? as usize;
            if pending > 0 {
                let mut buf = vec![0u8; pending];
                port.read_exact(&mut buf)?;
                seen.extend(buf);
            }
            if seen.windows(5).any(|w| w == b"BBIO1") {
                port.clear(ClearBuffer::Input)?;
                debug!("bridge in raw bit-bang mode");
                return Ok(());
            }
        }
        Err(BusError::Handshake {
            mode: "raw bit-bang",
            reply: seen,
        })
    }

    fn enter_bus_mode(&mut self) -> Result<(), BusError> {
        let (command, banner) = match self.cfg.mode {
            BusMode::Spi(_) => (cmd::ENTER_SPI, b"SPI1"),
            BusMode::I2c => (cmd::ENTER_I2C, b"I2C1"),
        };
        self.send(&[command])?;
        let reply = self.receive(banner.len())?;
        if reply != banner {
            return Err(BusError::Handshake {
                mode: self.cfg.mode.name(),
                reply,
            });
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<(), BusError> {
        self.command(peripherals_byte(self.cfg.power, self.cfg.pullups))?;
        match self.cfg.mode {
            BusMode::Spi(spi_mode) => {
                self.command(cmd::SPEED | speed_code(&SPI_SPEEDS, self.cfg.speed_hz))?;
                self.command(spi_config_byte(spi_mode))?;
            }
            BusMode::I2c => {
                self.command(cmd::SPEED | speed_code(&I2C_SPEEDS, self.cfg.speed_hz))?;
            }
        }
        Ok(())
    }

    fn chip_select(&mut self, level: IdleLevel) -> Result<(), BusError> {
        self.command(match level {
            IdleLevel::Low => cmd::SPI_CS_LOW,
            IdleLevel::High => cmd::SPI_CS_HIGH,
        })
    }

    fn shift(&self, byte: u8) -> u8 {
        match self.cfg.bit_order {
            BitOrder::MsbFirst => byte,
            BitOrder::LsbFirst => byte.reverse_bits(),
        }
    }

    /// Full-duplex SPI transfer, split into bridge-sized bulk commands.
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>, BusError> {
        let mut input = Vec::with_capacity(out.len());
        for chunk in out.chunks(BULK_MAX) {
            let mut packet = Vec::with_capacity(chunk.len() + 1);
            packet.push(cmd::BULK | (chunk.len() - 1) as u8);
            packet.extend(chunk.iter().map(|&b| self.shift(b)));
            self.send(&packet)?;
            let reply = self.receive(chunk.len() + 1)?;
            if reply[0] != cmd::OK {
                return Err(BusError::Rejected {
                    command: packet[0],
                    reply: reply[0],
                });
            }
            input.extend(reply[1..].iter().map(|&b| self.shift(b)));
        }
        Ok(input)
    }

    /// Bulk I2C write; the bridge answers each byte with 0x00 (ACK) or 0x01.
    fn i2c_write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let mut ack = Ack::Ack;
        for (index, chunk) in bytes.chunks(BULK_MAX).enumerate() {
            let mut packet = Vec::with_capacity(chunk.len() + 1);
            packet.push(cmd::BULK | (chunk.len() - 1) as u8);
            packet.extend_from_slice(chunk);
            self.send(&packet)?;
            let reply = self.receive(chunk.len() + 1)?;
            if reply[0] != cmd::OK {
                return Err(BusError::Rejected {
                    command: packet[0],
                    reply: reply[0],
                });
            }
            if let Some(pos) = reply[1..].iter().position(|&r| r != 0x00) {
                if ack == Ack::Ack {
                    self.last_error = Some(format!(
                        "NACK on byte {} of {}",
                        index * BULK_MAX + pos + 1,
                        bytes.len()
                    ));
                }
                ack = Ack::Nack;
            }
        }
        self.last_ack = ack;
        Ok(())
    }

    fn i2c_read(&mut self, count: usize) -> Result<Vec<u8>, BusError> {
        let answer = match self.ack_mode {
            Ack::Ack => cmd::I2C_ACK,
            Ack::Nack => cmd::I2C_NACK,
        };
        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            self.send(&[cmd::I2C_READ])?;
            data.push(self.receive(1)?[0]);
            self.command(answer)?;
        }
        Ok(data)
    }

    fn record<T>(&mut self, result: Result<T, BusError>) -> Result<T, BusError> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

impl BusPrimitives for BusPirate {
    fn mode(&self) -> BusMode {
        self.cfg.mode
    }

    fn configure_idle_level(&mut self, level: IdleLevel) -> Result<(), BusError> {
        if self.cfg.mode == BusMode::I2c {
            return Err(BusError::Unsupported("chip select idle level", "I2C"));
        }
        self.idle = level;
        let result = self.chip_select(level);
        self.record(result)
    }

    fn start(&mut self) -> Result<(), BusError> {
        let result = match self.cfg.mode {
            BusMode::Spi(_) => match self.idle {
                IdleLevel::Low => self.chip_select(IdleLevel::High),
                IdleLevel::High => self.chip_select(IdleLevel::Low),
            },
            BusMode::I2c => self.command(cmd::I2C_START),
        };
        self.record(result)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let result = match self.cfg.mode {
            BusMode::Spi(_) => self.transfer(bytes).map(|_| ()),
            BusMode::I2c => self.i2c_write(bytes),
        };
        self.record(result)
    }

    fn read(&mut self, count: usize) -> Result<Vec<u8>, BusError> {
        let result = match self.cfg.mode {
            BusMode::Spi(_) => self.transfer(&vec![0u8; count]),
            BusMode::I2c => self.i2c_read(count),
        };
        self.record(result)
    }

    fn last_ack(&self) -> Ack {
        self.last_ack
    }

    fn send_acks(&mut self) -> Result<(), BusError> {
        if self.cfg.mode != BusMode::I2c {
            return Err(BusError::Unsupported("acknowledgment control", "SPI"));
        }
        self.ack_mode = Ack::Ack;
        Ok(())
    }

    fn send_nacks(&mut self) -> Result<(), BusError> {
        if self.cfg.mode != BusMode::I2c {
            return Err(BusError::Unsupported("acknowledgment control", "SPI"));
        }
        self.ack_mode = Ack::Nack;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BusError> {
        let result = match self.cfg.mode {
            BusMode::Spi(_) => self.chip_select(self.idle),
            BusMode::I2c => self.command(cmd::I2C_STOP),
        };
        self.record(result)
    }

    fn close(&mut self) -> Result<(), BusError> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        // back to raw mode, then out to the interactive terminal
        port.write_all(&[cmd::RESET_BITBANG, cmd::RESET_TERMINAL])?;
        port.flush()?;
        info!("bridge on {} closed", self.cfg.port_name);
        Ok(())
    }

    fn describe_error(&self) -> String {
        self.last_error.clone().unwrap_or_else(|| "no error".to_string())
    }
}

impl Drop for BusPirate {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to reset bridge on {}: {e}", self.cfg.port_name);
        }
    }
}
