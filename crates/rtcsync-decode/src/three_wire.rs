//! DS1302 clock burst read-back.

use rtcsync_core::frame::three_wire::*;
use serde::Serialize;
use std::fmt;

use crate::{bcd_field, check_len, hours_field, plain_field, Date, DecodeError, Time};

/// Clock halt flag in the seconds register.
const CLOCK_HALT: u8 = 0x80;
/// 12-hour mode flag in the hours register.
const TWELVE_HOUR: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub date: Date,
    pub time: Time,
    /// 1 (Sunday) through 7.
    pub weekday: u8,
    pub twelve_hour: bool,
    /// Oscillator stopped; the time is not advancing.
    pub clock_halted: bool,
    pub write_protected: bool,
}

/// Decodes the eight clock registers returned by a burst read.
pub fn decode(regs: &[u8]) -> Result<Reading, DecodeError> {
    check_len(regs, REGISTER_COUNT)?;
    let (hour, twelve_hour) = hours_field(regs, HOURS, TWELVE_HOUR)?;
    Ok(Reading {
        date: Date {
            year: 2000 + bcd_field(regs, YEAR, 0xFF, "year", 0..=99)? as u16,
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
        clock_halted: regs[SECONDS] & CLOCK_HALT != 0,
        write_protected: regs[CONTROL] & WRITE_PROTECT != 0,
    })
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} wday {}", self.date, self.time, self.weekday)?;
        if self.clock_halted {
            f.write_str(" [halted]")?;
        }
        if self.write_protected {
            f.write_str(" [write protected]")?;
        }
        Ok(())
    }
}
