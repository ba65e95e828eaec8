//! Background polling of a [`Bno055`] on a dedicated thread.
//!
//! The driver is moved into the polling thread, so it keeps a single owner
//! and needs no locking. Everything else talks to the thread through
//! channels:
//!
//! - Orientation samples come out of a bounded channel. When the consumer
//!   falls behind, the oldest sample is dropped so the newest is always kept.
//! - Zeroing and shutdown requests go in through a command channel and are
//!   applied between updates.
//! - "Data ready" notifications (for example from a GPIO edge handler) go in
//!   through a [`DataReadyNotifier`] and trigger an immediate update.
//!
//! ```no_run
//! use std::time::Duration;
//! use bno055::{poller, Bno055, SerialPortTransport};
//!
//! let mut imu = Bno055::new(SerialPortTransport::open("/dev/ttyUSB0", 115_200)?);
//! imu.init(Duration::from_millis(500))?;
//!
//! let poller = poller::spawn(imu, poller::PollerConfig::default());
//! for sample in poller.samples().iter().take(100) {
//!     println!("{:?}", sample.orientation.euler);
//! }
//! let imu = poller.join()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use nalgebra::Quaternion;
use tracing::{debug, trace, warn};

use crate::clock::MonotonicClock;
use crate::driver::Bno055;
use crate::error::{Bno055Error, Bno055Result};
use crate::orientation::{EulerAngles, Orientation};
use crate::transport::SerialTransport;

/// Polling thread settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between updates. `None` polls only on data-ready notifications.
    pub interval: Option<Duration>,
    /// Number of samples buffered for the consumer
    pub sample_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_millis(10)),
            sample_capacity: 64,
        }
    }
}

/// One successful update, as published by the polling thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Increments by one for every successful update
    pub sequence: u64,
    /// When the update completed
    pub captured_at: Instant,
    /// Corrected orientation
    pub orientation: Orientation,
    pub raw_euler: EulerAngles,
    pub raw_quaternion: Quaternion<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Poll,
    ResetEuler,
    ResetQuaternion,
    Shutdown,
}

/// Cloneable handle that asks the polling thread for an immediate update.
///
/// Notifications coalesce: any number of calls before the thread wakes up
/// result in a single update.
#[derive(Debug, Clone)]
pub struct DataReadyNotifier {
    tx: Sender<()>,
}

impl DataReadyNotifier {
    /// Returns `false` once the polling thread has exited
    pub fn notify(&self) -> bool {
        !matches!(self.tx.try_send(()), Err(TrySendError::Disconnected(_)))
    }
}

/// Handle to a running polling thread.
pub struct Poller<T, C> {
    commands: Sender<Command>,
    samples: Receiver<OrientationSample>,
    notifier: DataReadyNotifier,
    handle: JoinHandle<Bno055<T, C>>,
}

/// Move `driver` onto a new polling thread.
///
/// # Panics
///
/// Panics if the OS refuses to create the thread.
pub fn spawn<T, C>(driver: Bno055<T, C>, config: PollerConfig) -> Poller<T, C>
where
    T: SerialTransport + Send + 'static,
    C: MonotonicClock + Send + 'static,
{
    let (command_tx, command_rx) = unbounded();
    let (sample_tx, sample_rx) = bounded(config.sample_capacity.max(1));
    let (ready_tx, ready_rx) = bounded(1);

    let overflow = sample_rx.clone();
    let handle = thread::Builder::new()
        .name("bno055-poller".to_string())
        .spawn(move || {
            run(
                driver,
                config.interval,
                command_rx,
                ready_rx,
                sample_tx,
                overflow,
            )
        })
        .unwrap_or_else(|e| panic!("failed to spawn BNO055 polling thread: {e}"));

    Poller {
        commands: command_tx,
        samples: sample_rx,
        notifier: DataReadyNotifier { tx: ready_tx },
        handle,
    }
}

impl<T, C> Poller<T, C> {
    /// Stream of orientation samples
    pub fn samples(&self) -> &Receiver<OrientationSample> {
        &self.samples
    }

    /// Drain buffered samples and return the newest, if any
    pub fn latest(&self) -> Option<OrientationSample> {
        self.samples.try_iter().last()
    }

    /// Handle for waking the thread from an interrupt or event source
    pub fn notifier(&self) -> DataReadyNotifier {
        self.notifier.clone()
    }

    /// Zero the Euler output at the current reading.
    pub fn reset_euler_reference(&self) -> Bno055Result<()> {
        self.send(Command::ResetEuler)
    }

    /// Zero the quaternion output at the current reading.
    pub fn reset_quaternion_reference(&self) -> Bno055Result<()> {
        self.send(Command::ResetQuaternion)
    }

    fn send(&self, command: Command) -> Bno055Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Bno055Error::PollerStopped)
    }

    /// Stop the thread and take back the driver.
    ///
    /// Returns [`Bno055Error::PollerStopped`] if the thread panicked.
    pub fn join(self) -> Bno055Result<Bno055<T, C>> {
        let _ = self.commands.send(Command::Shutdown);
        self.handle.join().map_err(|_| Bno055Error::PollerStopped)
    }
}

fn run<T, C>(
    mut driver: Bno055<T, C>,
    interval: Option<Duration>,
    commands: Receiver<Command>,
    data_ready: Receiver<()>,
    samples: Sender<OrientationSample>,
    overflow: Receiver<OrientationSample>,
) -> Bno055<T, C>
where
    T: SerialTransport,
    C: MonotonicClock,
{
    let mut sequence = 0u64;
    let mut consecutive_failures = 0u32;
    let mut next_poll = Instant::now();

    debug!("BNO055 poller started, interval {:?}", interval);

    loop {
        let timer = match interval {
            Some(_) => after(next_poll.saturating_duration_since(Instant::now())),
            None => never(),
        };

        let command = select! {
            recv(commands) -> command => Some(command.unwrap_or(Command::Shutdown)),
            recv(data_ready) -> event => event.ok().map(|()| Command::Poll),
            recv(timer) -> _ => Some(Command::Poll),
        };

        match command {
            Some(Command::Poll) => {}
            Some(Command::ResetEuler) => {
                driver.reset_euler_reference();
                continue;
            }
            Some(Command::ResetQuaternion) => {
                driver.reset_quaternion_reference();
                continue;
            }
            Some(Command::Shutdown) => break,
            None => continue,
        }

        if let Some(interval) = interval {
            next_poll = Instant::now() + interval;
        }

        match driver.update() {
            Ok(()) => {
                if consecutive_failures > 0 {
                    debug!(
                        "BNO055 update recovered after {} failure(s)",
                        consecutive_failures
                    );
                }
                consecutive_failures = 0;
                sequence += 1;

                let sample = OrientationSample {
                    sequence,
                    captured_at: Instant::now(),
                    orientation: driver.orientation(),
                    raw_euler: driver.raw_euler(),
                    raw_quaternion: driver.raw_quaternion(),
                };
                publish(&samples, &overflow, sample);
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "BNO055 update failed ({} in a row): {}",
                    consecutive_failures, e
                );
            }
        }
    }

    debug!("BNO055 poller stopped after {} samples", sequence);
    driver
}

/// Send `sample`, discarding the oldest buffered one if the channel is full
fn publish(
    samples: &Sender<OrientationSample>,
    overflow: &Receiver<OrientationSample>,
    sample: OrientationSample,
) {
    let mut pending = sample;
    loop {
        match samples.try_send(pending) {
            Ok(()) => return,
            Err(TrySendError::Full(rejected)) => {
                if let Ok(dropped) = overflow.try_recv() {
                    trace!("Dropping unread sample {}", dropped.sequence);
                }
                pending = rejected;
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}
