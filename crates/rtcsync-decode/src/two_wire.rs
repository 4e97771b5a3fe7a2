//! DS3231 register map read-back: time, control, status, aging and
//! temperature.

use rtcsync_core::frame::two_wire::*;
use serde::Serialize;
use std::fmt;

use crate::{bcd_field, check_len, hours_field, plain_field, Date, DecodeError, Time};

const TWELVE_HOUR: u8 = 0x40;
const CENTURY: u8 = 0x80;
/// Oscillator stop flag in the status register.
const OSCILLATOR_STOPPED: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub date: Date,
    pub time: Time,
    /// 1 through 7, day 1 being whatever the programmer chose.
    pub weekday: u8,
    pub twelve_hour: bool,
    pub control: u8,
    pub status: u8,
    /// Set after a power loss until cleared; the time may be invalid.
    pub oscillator_stopped: bool,
    pub aging_offset: i8,
    /// Degrees Celsius in 0.25 steps.
    pub temperature: f32,
}

/// Decodes the full register map starting at the seconds register.
pub fn decode(regs: &[u8]) -> Result<Reading, DecodeError> {
    check_len(regs, REGISTER_COUNT)?;
    let (hour, twelve_hour) = hours_field(regs, HOURS, TWELVE_HOUR)?;
    let century = if regs[MONTH] & CENTURY != 0 { 100 } else { 0 };
    Ok(Reading {
        date: Date {
            year: 2000 + century + bcd_field(regs, YEAR, 0xFF, "year", 0..=99)? as u16,
            month: bcd_field(regs, MONTH, 0x1F, "month", 1..=12)?,
            day: bcd_field(regs, DATE, 0x3F, "date", 1..=31)?,
        },
        time: Time {
            hour,
            minute: bcd_field(regs, MINUTES, 0x7F, "minute", 0..=59)?,
            second: bcd_field(regs, SECONDS, 0x7F, "second", 0..=59)?,
        },
        weekday: plain_field(regs, WEEKDAY, "weekday", 1..=7)?,
        twelve_hour,
        control: regs[CONTROL],
        status: regs[STATUS],
        oscillator_stopped: regs[STATUS] & OSCILLATOR_STOPPED != 0,
        aging_offset: regs[AGING] as i8,
        temperature: temperature(regs[TEMP_MSB], regs[TEMP_LSB]),
    })
}

/// Two's complement integer part in the MSB, quarter degrees in the top two
/// bits of the LSB.
fn temperature(msb: u8, lsb: u8) -> f32 {
    f32::from(msb as i8) + f32::from(lsb >> 6) * 0.25
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} wday {} {:.2}C",
            self.date, self.time, self.weekday, self.temperature
        )?;
        if self.oscillator_stopped {
            f.write_str(" [oscillator stopped]")?;
        }
        Ok(())
    }
}
