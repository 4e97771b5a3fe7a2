//! Register frame layouts for the supported RTC chips.
//!
//! A frame is the exact byte sequence that goes over the bus in one burst:
//! the chip's command or address header followed by the register block in
//! datasheet order.

use crate::bcd::{encode_bcd16, encode_bcd8};
use crate::snapshot::ClockSnapshot;

/// DS1302 style 3-wire chip, programmed with command-opcode bursts.
pub mod three_wire {
    pub const READ_CONTROL: u8 = 0x8F;
    pub const WRITE_CONTROL: u8 = 0x8E;
    pub const BURST_WRITE: u8 = 0xBE;
    pub const BURST_READ: u8 = 0xBF;

    /// Write-protect bit of the control register.
    pub const WRITE_PROTECT: u8 = 0x80;

    /// Clock registers covered by a burst, control register included.
    pub const REGISTER_COUNT: usize = 8;

    pub const SECONDS: usize = 0;
    pub const MINUTES: usize = 1;
    pub const HOURS: usize = 2;
    pub const DATE: usize = 3;
    pub const MONTH: usize = 4;
    pub const WEEKDAY: usize = 5;
    pub const YEAR: usize = 6;
    pub const CONTROL: usize = 7;
}

/// DS3231 style 2-wire chip, addressed by a register pointer.
pub mod two_wire {
    pub const DEFAULT_ADDRESS: u8 = 0x68;
    /// Register the pointer is reset to before programming or reading.
    pub const POINTER: u8 = 0x00;
    /// Time, alarm, control, status, aging and temperature registers.
    pub const REGISTER_COUNT: usize = 19;

    pub const SECONDS: usize = 0;
    pub const MINUTES: usize = 1;
    pub const HOURS: usize = 2;
    pub const WEEKDAY: usize = 3;
    pub const DATE: usize = 4;
    pub const MONTH: usize = 5;
    pub const YEAR: usize = 6;
    pub const ALARM1: usize = 7;
    pub const ALARM2: usize = 11;
    pub const CONTROL: usize = 14;
    pub const STATUS: usize = 15;
    pub const AGING: usize = 16;
    pub const TEMP_MSB: usize = 17;
    pub const TEMP_LSB: usize = 18;

    pub fn write_address(address: u8) -> u8 {
        address << 1
    }

    pub fn read_address(address: u8) -> u8 {
        (address << 1) | 1
    }
}

/// Which bus discipline and frame layout a device uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    ThreeWireBurst,
    TwoWireAddressed { address: u8 },
}

impl Variant {
    pub fn header_len(&self) -> usize {
        match self {
            Variant::ThreeWireBurst => 1,
            Variant::TwoWireAddressed { .. } => 2,
        }
    }

    pub fn register_count(&self) -> usize {
        match self {
            Variant::ThreeWireBurst => three_wire::REGISTER_COUNT,
            Variant::TwoWireAddressed { .. } => two_wire::REGISTER_COUNT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variant::ThreeWireBurst => "3-wire burst",
            Variant::TwoWireAddressed { .. } => "2-wire addressed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFrame {
    variant: Variant,
    bytes: Vec<u8>,
}

impl RegisterFrame {
    /// Lays `snapshot` out in the write frame of `variant`.
    pub fn encode(variant: Variant, snapshot: &ClockSnapshot) -> Self {
        let mut bytes = vec![0u8; variant.header_len() + variant.register_count()];
        let (header, regs) = bytes.split_at_mut(variant.header_len());
        match variant {
            Variant::ThreeWireBurst => {
                use three_wire::*;
                header[0] = BURST_WRITE;
                regs[SECONDS] = encode_bcd8(snapshot.second);
                regs[MINUTES] = encode_bcd8(snapshot.minute);
                regs[HOURS] = encode_bcd8(snapshot.hour);
                regs[DATE] = encode_bcd8(snapshot.day);
                regs[MONTH] = encode_bcd8(snapshot.month);
                regs[WEEKDAY] = snapshot.weekday;
                regs[YEAR] = encode_bcd16(snapshot.year);
            }
            Variant::TwoWireAddressed { address } => {
                use two_wire::*;
                header[0] = write_address(address);
                header[1] = POINTER;
                regs[SECONDS] = encode_bcd8(snapshot.second);
                regs[MINUTES] = encode_bcd8(snapshot.minute);
                regs[HOURS] = encode_bcd8(snapshot.hour);
                regs[WEEKDAY] = snapshot.weekday;
                regs[DATE] = encode_bcd8(snapshot.day);
                regs[MONTH] = encode_bcd8(snapshot.month);
                regs[YEAR] = encode_bcd16(snapshot.year);
            }
        }
        Self { variant, bytes }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.variant.header_len()]
    }

    pub fn registers(&self) -> &[u8] {
        &self.bytes[self.variant.header_len()..]
    }

    /// The seven calendar registers in the chip's own order.
    pub fn time_registers(&self) -> &[u8] {
        &self.registers()[..7]
    }

    pub fn seconds(&self) -> u8 {
        self.registers()[0]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ClockSnapshot {
        ClockSnapshot {
            second: 30,
            minute: 45,
            hour: 13,
            day: 15,
            month: 1,
            weekday: 2,
            year: 124,
        }
    }

    #[test]
    fn three_wire_frame_uses_burst_write_layout() {
        let frame = RegisterFrame::encode(Variant::ThreeWireBurst, &snapshot());
        assert_eq!(frame.len(), 9);
        assert_eq!(frame.header(), &[three_wire::BURST_WRITE]);
        assert_eq!(
            frame.time_registers(),
            &[0x30, 0x45, 0x13, 0x15, 0x01, 0x02, 0x24]
        );
        assert_eq!(frame.registers()[three_wire::CONTROL], 0);
    }

    #[test]
    fn three_wire_weekday_is_raw() {
        let mut snap = snapshot();
        for weekday in 1..=7 {
            snap.weekday = weekday;
            let frame = RegisterFrame::encode(Variant::ThreeWireBurst, &snap);
            assert_eq!(frame.registers()[three_wire::WEEKDAY], weekday);
        }
    }

    #[test]
    fn two_wire_frame_puts_weekday_before_date() {
        let variant = Variant::TwoWireAddressed { address: two_wire::DEFAULT_ADDRESS };
        let frame = RegisterFrame::encode(variant, &snapshot());
        assert_eq!(frame.len(), 21);
        assert_eq!(frame.header(), &[0xD0, 0x00]);
        assert_eq!(
            frame.time_registers(),
            &[0x30, 0x45, 0x13, 0x02, 0x15, 0x01, 0x24]
        );
        assert!(frame.registers()[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn two_wire_addresses_carry_direction_bit() {
        assert_eq!(two_wire::write_address(0x68), 0xD0);
        assert_eq!(two_wire::read_address(0x68), 0xD1);
    }
}
