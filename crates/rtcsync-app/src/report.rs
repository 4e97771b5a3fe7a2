//! Console rendering of programmed and polled frames.

use clap::ValueEnum;
use rtcsync_core::{Direction, TranscriptEntry, Variant};
use rtcsync_decode::{three_wire, two_wire, DecodeError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One line of hex bytes per frame.
    Hex,
    /// One JSON object per frame.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    ThreeWire(three_wire::Reading),
    TwoWire(two_wire::Reading),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::ThreeWire(r) => fmt::Display::fmt(r, f),
            Reading::TwoWire(r) => fmt::Display::fmt(r, f),
        }
    }
}

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    direction: &'static str,
    bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reading: Option<&'a Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decode_error: Option<String>,
}

fn error_record(error: impl fmt::Display) -> String {
    serde_json::json!({ "error": error.to_string() }).to_string()
}

pub struct Reporter {
    variant: Variant,
    format: Format,
    timestamps: bool,
    decode: bool,
}

impl Reporter {
    pub fn new(variant: Variant, format: Format, timestamps: bool, decode: bool) -> Self {
        Self {
            variant,
            format,
            timestamps,
            decode,
        }
    }

    /// Decodes the register part of a frame. Written frames carry the
    /// command or address header in front of the registers.
    fn decode(&self, entry: &TranscriptEntry) -> Option<Result<Reading, DecodeError>> {
        if !self.decode {
            return None;
        }
        let regs = match entry.direction {
            Direction::Tx => entry.data.get(self.variant.header_len()..).unwrap_or_default(),
            Direction::Rx => &entry.data[..],
        };
        Some(match self.variant {
            Variant::ThreeWireBurst => three_wire::decode(regs).map(Reading::ThreeWire),
            Variant::TwoWireAddressed { .. } => two_wire::decode(regs).map(Reading::TwoWire),
        })
    }

    pub fn render(&self, entry: &TranscriptEntry) -> String {
        let decoded = self.decode(entry);
        match self.format {
            Format::Hex => {
                let mut line = entry.to_line(self.timestamps);
                match decoded {
                    Some(Ok(reading)) => line.push_str(&format!("  ({reading})")),
                    Some(Err(e)) => line.push_str(&format!("  (undecodable: {e})")),
                    None => {}
                }
                line
            }
            Format::Json => {
                let (reading, decode_error) = match &decoded {
                    Some(Ok(reading)) => (Some(reading), None),
                    Some(Err(e)) => (None, Some(e.to_string())),
                    None => (None, None),
                };
                let record = Record {
                    timestamp: entry.timestamp.to_rfc3339(),
                    direction: match entry.direction {
                        Direction::Tx => "tx",
                        Direction::Rx => "rx",
                    },
                    bytes: hex::encode(&entry.data),
                    reading,
                    decode_error,
                };
                serde_json::to_string(&record).unwrap_or_else(|e| error_record(&e))
            }
        }
    }

    pub fn emit(&self, entry: &TranscriptEntry) {
        println!("{}", self.render(entry));
    }
}
