//! Bus transaction sequencing for each RTC variant.
//!
//! A driver owns its bus for the lifetime of the device session and turns
//! each logical operation into the exact primitive sequence the chip expects.
//! Every transaction is terminated with a stop before any error is handed
//! back, so the bus is never left mid-transfer.

use log::{debug, warn};

use crate::bus::{Ack, BusPrimitives, IdleLevel};
use crate::error::{BusError, Error, Result, TransactionLeg};
use crate::frame::{three_wire, two_wire, RegisterFrame, Variant};

/// Program and poll operations shared by every supported chip.
pub trait RtcDriver {
    fn variant(&self) -> Variant;

    fn program_time(&mut self, frame: &RegisterFrame) -> Result<()>;

    fn read_time(&mut self) -> Result<Vec<u8>>;

    fn close(&mut self) -> Result<()>;
}

/// Runs `body` between a start and a stop. The stop is issued even when
/// `body` fails, and the body's error wins over a failing stop.
fn transaction<B, T, F>(bus: &mut B, body: F) -> Result<T>
where
    B: BusPrimitives,
    F: FnOnce(&mut B) -> Result<T>,
{
    bus.start()?;
    let result = body(bus);
    let stopped = bus.stop();
    if let (Err(_), Err(e)) = (&result, &stopped) {
        warn!("stop after failed transaction also failed: {e}");
    }
    let value = result?;
    stopped?;
    Ok(value)
}

fn check_variant(expected: Variant, frame: &RegisterFrame) -> Result<()> {
    if frame.variant() != expected {
        return Err(Error::FrameMismatch {
            expected: expected.name(),
            got: frame.variant().name(),
        });
    }
    Ok(())
}

fn read_exact<B: BusPrimitives>(bus: &mut B, count: usize) -> Result<Vec<u8>> {
    let data = bus.read(count)?;
    if data.len() != count {
        return Err(BusError::ShortRead {
            wanted: count,
            got: data.len(),
        }
        .into());
    }
    Ok(data)
}

/// DS1302 style chip on a 3-wire bus. Every operation is a single burst
/// framed by one command byte; the bus has no acknowledgment signal.
pub struct ThreeWireBurst<B> {
    bus: B,
}

impl<B: BusPrimitives> ThreeWireBurst<B> {
    /// Takes over `bus` and parks chip enable low between transactions.
    pub fn new(mut bus: B) -> Result<Self> {
        bus.configure_idle_level(IdleLevel::Low)?;
        Ok(Self { bus })
    }

    pub fn read_control(&mut self) -> Result<u8> {
        let data = transaction(&mut self.bus, |bus| {
            bus.write(&[three_wire::READ_CONTROL])?;
            read_exact(bus, 1)
        })?;
        debug!("control register: {:02x}", data[0]);
        Ok(data[0])
    }

    pub fn write_control(&mut self, value: u8) -> Result<()> {
        debug!("writing control register: {value:02x}");
        transaction(&mut self.bus, |bus| {
            bus.write(&[three_wire::WRITE_CONTROL])?;
            bus.write(&[value])?;
            Ok(())
        })
    }

    /// Read/modify/write of the control register dropping the write-protect
    /// bit. Only RAM writes need it; clock registers are writable either way.
    /// Returns the value written.
    pub fn clear_write_protect(&mut self) -> Result<u8> {
        let control = self.read_control()? & !three_wire::WRITE_PROTECT;
        self.write_control(control)?;
        Ok(control)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: BusPrimitives> RtcDriver for ThreeWireBurst<B> {
    fn variant(&self) -> Variant {
        Variant::ThreeWireBurst
    }

    fn program_time(&mut self, frame: &RegisterFrame) -> Result<()> {
        check_variant(self.variant(), frame)?;
        debug!("burst write: {:02x?}", frame.as_bytes());
        transaction(&mut self.bus, |bus| Ok(bus.write(frame.as_bytes())?))
    }

    fn read_time(&mut self) -> Result<Vec<u8>> {
        transaction(&mut self.bus, |bus| {
            bus.write(&[three_wire::BURST_READ])?;
            read_exact(bus, three_wire::REGISTER_COUNT)
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.bus.close()?)
    }
}

/// DS3231 style chip on a 2-wire bus, addressed through a register pointer.
/// Each write leg is gated on the device's acknowledgment.
pub struct TwoWireAddressed<B> {
    bus: B,
    address: u8,
    registers: usize,
}

impl<B: BusPrimitives> TwoWireAddressed<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            registers: two_wire::REGISTER_COUNT,
        }
    }

    /// Overrides how many registers a poll reads back, for parts with a
    /// shorter or longer register map than the DS3231.
    pub fn with_register_count(mut self, registers: usize) -> Self {
        self.registers = registers.max(1);
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

fn require_ack<B: BusPrimitives>(bus: &B, address: u8, leg: TransactionLeg) -> Result<()> {
    match bus.last_ack() {
        Ack::Ack => Ok(()),
        Ack::Nack => Err(Error::TransactionAck {
            leg,
            address,
            detail: bus.describe_error(),
        }),
    }
}

impl<B: BusPrimitives> RtcDriver for TwoWireAddressed<B> {
    fn variant(&self) -> Variant {
        Variant::TwoWireAddressed {
            address: self.address,
        }
    }

    fn program_time(&mut self, frame: &RegisterFrame) -> Result<()> {
        check_variant(self.variant(), frame)?;
        let address = self.address;
        debug!("addressed write: {:02x?}", frame.as_bytes());
        transaction(&mut self.bus, |bus| {
            bus.write(frame.as_bytes())?;
            require_ack(bus, address, TransactionLeg::Program)
        })
    }

    fn read_time(&mut self) -> Result<Vec<u8>> {
        let address = self.address;
        let registers = self.registers;
        transaction(&mut self.bus, |bus| {
            bus.write(&[two_wire::write_address(address), two_wire::POINTER])?;
            require_ack(bus, address, TransactionLeg::WritePointer)?;

            bus.start()?;
            bus.write(&[two_wire::read_address(address)])?;
            require_ack(bus, address, TransactionLeg::ReadAddress)?;

            // The final byte must be answered with a NACK to end the transfer.
            let mut data = Vec::with_capacity(registers);
            if registers > 1 {
                bus.send_acks()?;
                data.extend(read_exact(bus, registers - 1)?);
            }
            bus.send_nacks()?;
            data.extend(read_exact(bus, 1)?);
            Ok(data)
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.bus.close()?)
    }
}
