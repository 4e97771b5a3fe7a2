//! Once-a-second polling of a programmed RTC.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info};
use std::time::Duration;

use crate::driver::RtcDriver;
use crate::error::Error;

/// Cooperative cancellation, consulted once per poll iteration.
pub trait StopSignal {
    fn should_stop(&mut self) -> bool;

    /// Waits out the gap between polls. May return early once a stop has
    /// been requested.
    fn pause(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Requests a stop of the [`RunFlag`] it was created with. Cloneable and
/// safe to trip from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // a full channel already carries a pending stop
        let _ = self.tx.try_send(());
    }
}

/// Run/stop state owned by the poll loop. Starts out running and latches
/// stopped once its [`StopHandle`] fires or every handle is dropped.
#[derive(Debug)]
pub struct RunFlag {
    rx: Receiver<()>,
    stopped: bool,
}

pub fn run_flag() -> (StopHandle, RunFlag) {
    let (tx, rx) = bounded(1);
    (StopHandle { tx }, RunFlag { rx, stopped: false })
}

impl StopSignal for RunFlag {
    fn should_stop(&mut self) -> bool {
        if !self.stopped {
            match self.rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => self.stopped = true,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.stopped
    }

    fn pause(&mut self, interval: Duration) {
        if self.stopped {
            return;
        }
        match self.rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.stopped = true,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Replays a fixed sequence of running flags, one per iteration. Runs out
/// as stopped.
pub struct FlagSequence<I> {
    flags: I,
}

impl<I: Iterator<Item = bool>> FlagSequence<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(flags: T) -> Self {
        Self {
            flags: flags.into_iter(),
        }
    }
}

impl<I: Iterator<Item = bool>> StopSignal for FlagSequence<I> {
    fn should_stop(&mut self) -> bool {
        !self.flags.next().unwrap_or(false)
    }

    fn pause(&mut self, _interval: Duration) {}
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    Cancelled { polls: u64 },
    Failed { polls: u64, error: Error },
}

impl PollOutcome {
    pub fn polls(&self) -> u64 {
        match self {
            PollOutcome::Cancelled { polls } | PollOutcome::Failed { polls, .. } => *polls,
        }
    }
}

/// Polls `driver` until `stop` fires or a read transaction fails, handing
/// every raw register block to `report`.
///
/// A failed read ends the loop; it is never retried.
pub fn poll<D, S, R>(driver: &mut D, stop: &mut S, config: &PollConfig, mut report: R) -> PollOutcome
where
    D: RtcDriver + ?Sized,
    S: StopSignal + ?Sized,
    R: FnMut(&[u8]),
{
    let mut polls = 0u64;
    info!(
        "polling {} RTC every {:?}",
        driver.variant().name(),
        config.interval
    );
    loop {
        if stop.should_stop() {
            debug!("poll loop cancelled after {polls} reads");
            return PollOutcome::Cancelled { polls };
        }
        stop.pause(config.interval);
        match driver.read_time() {
            Ok(frame) => {
                polls += 1;
                report(&frame);
            }
            Err(error) => {
                debug!("poll {} failed: {error}", polls + 1);
                return PollOutcome::Failed { polls, error };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{Call, RecordingBus};
    use crate::bus::{Ack, BusMode};
    use crate::driver::{ThreeWireBurst, TwoWireAddressed};
    use crate::error::TransactionLeg;

    fn quick() -> PollConfig {
        PollConfig {
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn stopped_before_first_iteration_reads_nothing() {
        let mut rtc = ThreeWireBurst::new(RecordingBus::new(BusMode::Spi(3))).unwrap();
        let mut stop = FlagSequence::new([false]);
        let mut frames = Vec::new();
        let outcome = poll(&mut rtc, &mut stop, &quick(), |f| frames.push(f.to_vec()));
        assert!(matches!(outcome, PollOutcome::Cancelled { polls: 0 }));
        assert!(frames.is_empty());
        assert!(rtc.bus().reads().is_empty());
    }

    #[test]
    fn reports_one_frame_per_running_iteration() {
        let bus = RecordingBus::new(BusMode::Spi(3))
            .script_read(vec![0x01; 8])
            .script_read(vec![0x02; 8])
            .script_read(vec![0x03; 8]);
        let mut rtc = ThreeWireBurst::new(bus).unwrap();
        let mut stop = FlagSequence::new([true, true, true, false]);
        let mut frames = Vec::new();
        let outcome = poll(&mut rtc, &mut stop, &quick(), |f| frames.push(f[0]));
        assert_eq!(outcome.polls(), 3);
        assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
        assert_eq!(frames, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn write_pointer_nack_stops_after_that_iteration() {
        let bus = RecordingBus::new(BusMode::I2c).script_acks(&[Ack::Ack, Ack::Ack, Ack::Nack]);
        let mut rtc = TwoWireAddressed::new(bus, 0x68);
        let mut stop = FlagSequence::new(std::iter::repeat(true));
        let mut frames = 0;
        let outcome = poll(&mut rtc, &mut stop, &quick(), |_| frames += 1);
        match outcome {
            PollOutcome::Failed { polls, error } => {
                assert_eq!(polls, 1);
                assert!(matches!(
                    error,
                    Error::TransactionAck {
                        leg: TransactionLeg::WritePointer,
                        ..
                    }
                ));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(frames, 1);
        // only the first, successful poll read anything
        assert_eq!(rtc.bus().reads(), vec![18, 1]);
        assert_eq!(rtc.bus().calls.last(), Some(&Call::Stop));
    }

    #[test]
    fn three_wire_bus_error_ends_polling() {
        let mut bus = RecordingBus::new(BusMode::Spi(3));
        bus.fail_reads = true;
        let mut rtc = ThreeWireBurst::new(bus).unwrap();
        let mut stop = FlagSequence::new(std::iter::repeat(true));
        let outcome = poll(&mut rtc, &mut stop, &quick(), |_| {});
        match outcome {
            PollOutcome::Failed { polls, error } => {
                assert_eq!(polls, 0);
                assert!(matches!(error, Error::Bus(crate::error::BusError::Timeout)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(rtc.bus().calls.last(), Some(&Call::Stop));
    }

    #[test]
    fn run_flag_latches_once_stopped() {
        let (handle, mut flag) = run_flag();
        assert!(!flag.should_stop());
        handle.stop();
        handle.stop();
        assert!(flag.should_stop());
        assert!(flag.should_stop());
    }

    #[test]
    fn run_flag_pause_wakes_on_stop() {
        let (handle, mut flag) = run_flag();
        handle.stop();
        let started = std::time::Instant::now();
        flag.pause(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(flag.should_stop());
    }

    #[test]
    fn dropping_every_handle_stops_the_flag() {
        let (handle, mut flag) = run_flag();
        drop(handle);
        assert!(flag.should_stop());
    }

    #[test]
    fn cancellation_from_another_thread_ends_the_loop() {
        let (handle, mut flag) = run_flag();
        let mut rtc = ThreeWireBurst::new(RecordingBus::new(BusMode::Spi(3))).unwrap();
        let mut polls = 0;
        let stopper = std::thread::spawn(move || handle.stop());
        stopper.join().unwrap();
        let outcome = poll(&mut rtc, &mut flag, &quick(), |_| polls += 1);
        assert!(matches!(outcome, PollOutcome::Cancelled { polls: 0 }));
        assert_eq!(polls, 0);
    }
}
