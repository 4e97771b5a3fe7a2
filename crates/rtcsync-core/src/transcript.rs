use chrono::{DateTime, Local};

/// TX is a frame written to the RTC, RX a register block read back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Rx,
    Tx,
}

/// One frame exchanged with the RTC, stamped with the local time it passed.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub data: Vec<u8>,
}

impl TranscriptEntry {
    pub fn new(direction: Direction, data: Vec<u8>) -> Self {
        Self::at(Local::now(), direction, data)
    }

    pub fn at(timestamp: DateTime<Local>, direction: Direction, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            direction,
            data,
        }
    }

    /// `[HH:MM:SS.mmm] RX: 30 45 13 ...`
    pub fn to_line(&self, show_timestamp: bool) -> String {
        let mut line = String::new();
        if show_timestamp {
            line.push_str(&format!("[{}] ", self.timestamp.format("%H:%M:%S%.3f")));
        }
        line.push_str(match self.direction {
            Direction::Rx => "RX:",
            Direction::Tx => "TX:",
        });
        for byte in &self.data {
            line.push_str(&format!(" {byte:02x}"));
        }
        line
    }
}
