//! Wall-clock capture that never straddles a seconds boundary.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use log::{debug, trace};

use crate::frame::{RegisterFrame, Variant};

pub trait WallClock {
    fn now(&mut self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&mut self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Calendar fields of one wall-clock reading, in the widths the BCD codec
/// takes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub second: i8,
    pub minute: i8,
    pub hour: i8,
    pub day: i8,
    pub month: i8,
    /// 1 (Sunday) through 7 (Saturday).
    pub weekday: u8,
    /// Years since 1900.
    pub year: i16,
}

impl ClockSnapshot {
    pub fn from_datetime(t: &NaiveDateTime) -> Self {
        Self {
            second: t.second() as i8,
            minute: t.minute() as i8,
            hour: t.hour() as i8,
            day: t.day() as i8,
            month: t.month() as i8,
            weekday: t.weekday().number_from_sunday() as u8,
            year: (t.year() - 1900) as i16,
        }
    }
}

/// Reads `clock` and encodes it into the write frame of `variant`.
///
/// The clock is read again after encoding and the whole capture is repeated
/// if the second has ticked over in between, so the frame always describes a
/// single one-second tick. There is no retry limit.
pub fn capture_and_encode<C>(variant: Variant, clock: &mut C) -> RegisterFrame
where
    C: WallClock + ?Sized,
{
    let mut attempts = 1u32;
    loop {
        let first = clock.now();
        let frame = RegisterFrame::encode(variant, &ClockSnapshot::from_datetime(&first));
        let check = clock.now();
        if whole_seconds(&first) == whole_seconds(&check) {
            if attempts > 1 {
                debug!("time snapshot settled after {attempts} attempts");
            }
            return frame;
        }
        trace!("second changed during capture ({first} -> {check}), retrying");
        attempts += 1;
    }
}

fn whole_seconds(t: &NaiveDateTime) -> i64 {
    t.and_utc().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcd::decode_bcd;
    use crate::frame::three_wire;
    use chrono::NaiveDate;
    use std::collections::VecDeque;

    /// Replays a fixed list of readings, repeating the last one forever.
    struct ScriptedClock {
        readings: VecDeque<NaiveDateTime>,
        last: NaiveDateTime,
        reads: usize,
    }

    impl ScriptedClock {
        fn new(readings: Vec<NaiveDateTime>) -> Self {
            let last = *readings.last().expect("at least one reading");
            Self { readings: readings.into(), last, reads: 0 }
        }
    }

    impl WallClock for ScriptedClock {
        fn now(&mut self) -> NaiveDateTime {
            self.reads += 1;
            if let Some(t) = self.readings.pop_front() {
                self.last = t;
            }
            self.last
        }
    }

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn snapshot_fields_follow_calendar_conventions() {
        let snap = ClockSnapshot::from_datetime(&at(13, 45, 30, 0));
        assert_eq!(
            snap,
            ClockSnapshot {
                second: 30,
                minute: 45,
                hour: 13,
                day: 15,
                month: 1,
                weekday: 2,
                year: 124,
            }
        );
    }

    #[test]
    fn encodes_monday_afternoon_for_three_wire() {
        let mut clock = ScriptedClock::new(vec![at(13, 45, 30, 100)]);
        let frame = capture_and_encode(Variant::ThreeWireBurst, &mut clock);
        assert_eq!(frame.header(), &[three_wire::BURST_WRITE]);
        assert_eq!(
            frame.time_registers(),
            &[0x30, 0x45, 0x13, 0x15, 0x01, 0x02, 0x24]
        );
        assert_eq!(clock.reads, 2);
    }

    #[test]
    fn retries_when_second_ticks_during_capture() {
        let mut clock = ScriptedClock::new(vec![
            at(13, 45, 29, 999),
            at(13, 45, 30, 1),
            at(13, 45, 30, 2),
            at(13, 45, 30, 3),
        ]);
        let frame = capture_and_encode(Variant::ThreeWireBurst, &mut clock);
        assert_eq!(clock.reads, 4);
        assert_eq!(frame.seconds(), 0x30);

        let after = ClockSnapshot::from_datetime(&clock.now());
        assert_eq!(decode_bcd(frame.seconds()), after.second as u8);
    }

    #[test]
    fn retries_across_midnight() {
        let late = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap();
        let early = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_milli_opt(0, 0, 0, 1)
            .unwrap();
        let mut clock = ScriptedClock::new(vec![late, early, early]);
        let variant = Variant::TwoWireAddressed { address: 0x68 };
        let frame = capture_and_encode(variant, &mut clock);
        assert_eq!(frame.time_registers(), &[0x00, 0x00, 0x00, 0x02, 0x01, 0x01, 0x24]);
    }
}
