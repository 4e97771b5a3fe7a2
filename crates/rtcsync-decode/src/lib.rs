//! Decoding of RTC register blocks read back during polling.

pub mod three_wire;
pub mod two_wire;

use rtcsync_core::decode_bcd;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} register bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("register {register} holds 0x{value:02x}, not a valid {field}")]
    Field {
        field: &'static str,
        register: usize,
        value: u8,
    },
}

fn check_len(regs: &[u8], expected: usize) -> Result<(), DecodeError> {
    if regs.len() < expected {
        return Err(DecodeError::Length {
            expected,
            got: regs.len(),
        });
    }
    Ok(())
}

/// Decodes the BCD digits of `regs[register] & mask` and checks the result
/// lies in `range`.
fn bcd_field(
    regs: &[u8],
    register: usize,
    mask: u8,
    field: &'static str,
    range: RangeInclusive<u8>,
) -> Result<u8, DecodeError> {
    let raw = regs[register] & mask;
    let invalid = DecodeError::Field {
        field,
        register,
        value: regs[register],
    };
    if raw & 0x0F > 9 || raw >> 4 > 9 {
        return Err(invalid);
    }
    let value = decode_bcd(raw);
    if !range.contains(&value) {
        return Err(invalid);
    }
    Ok(value)
}

fn plain_field(
    regs: &[u8],
    register: usize,
    field: &'static str,
    range: RangeInclusive<u8>,
) -> Result<u8, DecodeError> {
    let value = regs[register];
    if !range.contains(&value) {
        return Err(DecodeError::Field {
            field,
            register,
            value,
        });
    }
    Ok(value)
}

/// Hours register shared by both chips: `twelve_hour_bit` selects 12-hour
/// mode, in which bit 5 marks PM and the low five bits hold 1-12.
fn hours_field(regs: &[u8], register: usize, twelve_hour_bit: u8) -> Result<(u8, bool), DecodeError> {
    if regs[register] & twelve_hour_bit == 0 {
        return Ok((bcd_field(regs, register, 0x3F, "hour", 0..=23)?, false));
    }
    let hour = bcd_field(regs, register, 0x1F, "hour", 1..=12)?;
    let pm = regs[register] & 0x20 != 0;
    Ok((hour % 12 + if pm { 12 } else { 0 }, true))
}
