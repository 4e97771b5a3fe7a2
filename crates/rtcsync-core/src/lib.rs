//! Core functionalities: BCD codec, time snapshots, register frames, bus
//! sequencing, polling and the serial bridge.

pub mod bcd;
pub mod bridge;
pub mod bus;
pub mod driver;
pub mod error;
pub mod frame;
pub mod poll;
pub mod snapshot;
pub mod transcript;

pub use bcd::{decode_bcd, encode_bcd16, encode_bcd8};
pub use bridge::{list_ports, BridgeConfig, BusPirate, PortInfo};
pub use bus::{Ack, BitOrder, BusMode, BusPrimitives, IdleLevel};
pub use driver::{RtcDriver, ThreeWireBurst, TwoWireAddressed};
pub use error::{BusError, Error, Result, TransactionLeg};
pub use frame::{RegisterFrame, Variant};
pub use poll::{poll, run_flag, FlagSequence, PollConfig, PollOutcome, RunFlag, StopHandle, StopSignal};
pub use snapshot::{capture_and_encode, ClockSnapshot, LocalClock, WallClock};
pub use transcript::{Direction, TranscriptEntry};
