//! Bus primitives an RTC driver is sequenced against.

use crate::error::BusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// SPI with clock polarity and phase given as the usual mode number 0-3.
    Spi(u8),
    I2c,
}

impl BusMode {
    pub fn name(&self) -> &'static str {
        match self {
            BusMode::Spi(_) => "SPI",
            BusMode::I2c => "I2C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleLevel {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ack,
    Nack,
}

/// Blocking transaction primitives of a serial bus bridge.
///
/// Opening is left to the concrete bridge's constructor. Every call blocks
/// until the bridge has carried it out.
pub trait BusPrimitives {
    fn mode(&self) -> BusMode;

    /// Chip-select level outside of a transaction. SPI only.
    fn configure_idle_level(&mut self, level: IdleLevel) -> Result<(), BusError>;

    /// Start condition on I2C, chip-select assert on SPI.
    fn start(&mut self) -> Result<(), BusError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    fn read(&mut self, count: usize) -> Result<Vec<u8>, BusError>;

    /// Acknowledgment of the most recent write. Always [`Ack::Ack`] on buses
    /// without an acknowledgment signal.
    fn last_ack(&self) -> Ack;

    fn send_acks(&mut self) -> Result<(), BusError>;

    fn send_nacks(&mut self) -> Result<(), BusError>;

    /// Stop condition on I2C, chip-select release on SPI.
    fn stop(&mut self) -> Result<(), BusError>;

    /// Returns the bridge to its idle state and releases the handle.
    /// Further calls fail with [`BusError::Closed`].
    fn close(&mut self) -> Result<(), BusError>;

    fn describe_error(&self) -> String;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        IdleLevel(IdleLevel),
        Start,
        Write(Vec<u8>),
        Read(usize),
        SendAcks,
        SendNacks,
        Stop,
        Close,
    }

    /// Records every primitive and replays scripted acknowledgments and
    /// read data.
    pub(crate) struct RecordingBus {
        mode: BusMode,
        pub(crate) calls: Vec<Call>,
        acks: VecDeque<Ack>,
        reads: VecDeque<Vec<u8>>,
        last_ack: Ack,
        pub(crate) fail_reads: bool,
    }

    impl RecordingBus {
        pub(crate) fn new(mode: BusMode) -> Self {
            Self {
                mode,
                calls: Vec::new(),
                acks: VecDeque::new(),
                reads: VecDeque::new(),
                last_ack: Ack::Ack,
                fail_reads: false,
            }
        }

        /// Acknowledgment reported after each upcoming write, in order.
        /// Writes past the end of the script are acknowledged.
        pub(crate) fn script_acks(mut self, acks: &[Ack]) -> Self {
            self.acks.extend(acks.iter().copied());
            self
        }

        pub(crate) fn script_read(mut self, data: Vec<u8>) -> Self {
            self.reads.push_back(data);
            self
        }

        pub(crate) fn reads(&self) -> Vec<usize> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Read(n) => Some(*n),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn position(&self, call: &Call) -> Option<usize> {
            self.calls.iter().position(|c| c == call)
        }
    }

    impl BusPrimitives for RecordingBus {
        fn mode(&self) -> BusMode {
            self.mode
        }

        fn configure_idle_level(&mut self, level: IdleLevel) -> Result<(), BusError> {
            self.calls.push(Call::IdleLevel(level));
            Ok(())
        }

        fn start(&mut self) -> Result<(), BusError> {
            self.calls.push(Call::Start);
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
            self.calls.push(Call::Write(bytes.to_vec()));
            self.last_ack = self.acks.pop_front().unwrap_or(Ack::Ack);
            Ok(())
        }

        fn read(&mut self, count: usize) -> Result<Vec<u8>, BusError> {
            self.calls.push(Call::Read(count));
            if self.fail_reads {
                return Err(BusError::Timeout);
            }
            let mut data = self.reads.pop_front().unwrap_or_default();
            data.resize(count, 0);
            Ok(data)
        }

        fn last_ack(&self) -> Ack {
            self.last_ack
        }

        fn send_acks(&mut self) -> Result<(), BusError> {
            self.calls.push(Call::SendAcks);
            Ok(())
        }

        fn send_nacks(&mut self) -> Result<(), BusError> {
            self.calls.push(Call::SendNacks);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), BusError> {
            self.calls.push(Call::Stop);
            Ok(())
        }

        fn close(&mut self) -> Result<(), BusError> {
            self.calls.push(Call::Close);
            Ok(())
        }

        fn describe_error(&self) -> String {
            match self.last_ack {
                Ack::Ack => "no error".to_string(),
                Ack::Nack => "received NACK".to_string(),
            }
        }
    }
}
