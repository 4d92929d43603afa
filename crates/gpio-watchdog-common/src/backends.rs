//! [`GpioAccessor`] implementations.
//!
//! - [`RaspiGpio`]: the `raspi-gpio` tool, direct register access
//! - [`Pigs`]: the `pigs` client of the pigpio daemon, which the gate
//!   automation firmware also drives
//! - [`SimulatedGpio`]: in-memory pins for tests and hardware-free runs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::error::{GpioError, GpioResult};
use crate::gpio::{GpioAccessor, GpioOp, Level, PinId};
use crate::shell::{self, PIGS_CMD, RASPI_GPIO_CMD};

/// Matches the level field of `raspi-gpio get` output, e.g.
/// `GPIO 4: level=1 fsel=1 func=OUTPUT pull=DOWN`.
static RASPI_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\blevel=([01])\b").expect("Invalid regex pattern"));

/// Extracts the pin level from `raspi-gpio get` output.
pub fn parse_raspi_gpio_level(output: &str) -> Option<Level> {
    let caps = RASPI_LEVEL_RE.captures(output)?;
    match caps.get(1)?.as_str() {
        "0" => Some(Level::Low),
        "1" => Some(Level::High),
        _ => None,
    }
}

/// Extracts the pin level from `pigs r` output (a bare `0` or `1`).
pub fn parse_pigs_level(output: &str) -> Option<Level> {
    match output.trim() {
        "0" => Some(Level::Low),
        "1" => Some(Level::High),
        _ => None,
    }
}

/// Backend driving pins through the `raspi-gpio` tool.
#[derive(Debug, Clone)]
pub struct RaspiGpio {
    program: String,
    timeout: Duration,
}

impl RaspiGpio {
    /// Creates a backend using the system `raspi-gpio`; each invocation is
    /// killed after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_program(RASPI_GPIO_CMD, timeout)
    }

    /// Creates a backend using an alternative `raspi-gpio` binary.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GpioAccessor for RaspiGpio {
    fn name(&self) -> &str {
        "raspi-gpio"
    }

    async fn read(&self, pin: PinId) -> GpioResult<Level> {
        let bcm = pin.bcm().to_string();
        let args = ["get", bcm.as_str()];
        let output = shell::exec_or_throw(&self.program, &args, self.timeout).await?;
        parse_raspi_gpio_level(&output).ok_or_else(|| GpioError::Parse {
            command: shell::command_line(&self.program, &args),
            output,
        })
    }

    async fn write(&self, pin: PinId, level: Level) -> GpioResult<()> {
        let bcm = pin.bcm().to_string();
        let drive = match level {
            Level::High => "dh",
            Level::Low => "dl",
        };
        let args = ["set", bcm.as_str(), "op", drive];
        shell::exec_or_throw(&self.program, &args, self.timeout).await?;
        Ok(())
    }
}

/// Backend driving pins through the pigpio daemon's `pigs` client.
#[derive(Debug, Clone)]
pub struct Pigs {
    program: String,
    timeout: Duration,
}

impl Pigs {
    /// Creates a backend using the system `pigs`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_program(PIGS_CMD, timeout)
    }

    /// Creates a backend using an alternative `pigs` binary.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GpioAccessor for Pigs {
    fn name(&self) -> &str {
        "pigs"
    }

    async fn read(&self, pin: PinId) -> GpioResult<Level> {
        let bcm = pin.bcm().to_string();
        let args = ["r", bcm.as_str()];
        let output = shell::exec_or_throw(&self.program, &args, self.timeout).await?;
        parse_pigs_level(&output).ok_or_else(|| GpioError::Parse {
            command: shell::command_line(&self.program, &args),
            output,
        })
    }

    async fn write(&self, pin: PinId, level: Level) -> GpioResult<()> {
        let bcm = pin.bcm().to_string();
        let bit = level.as_bit().to_string();
        let args = ["w", bcm.as_str(), bit.as_str()];
        shell::exec_or_throw(&self.program, &args, self.timeout).await?;
        Ok(())
    }
}

/// One accepted write, as recorded by [`SimulatedGpio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    /// Target pin.
    pub pin: PinId,
    /// Requested level.
    pub level: Level,
}

#[derive(Debug, Default)]
struct SimState {
    levels: HashMap<PinId, Level>,
    scripts: HashMap<PinId, VecDeque<Level>>,
    read_failures: HashMap<PinId, u32>,
    write_failures: HashMap<PinId, u32>,
    stuck: HashSet<PinId>,
    writes: Vec<WriteRecord>,
    write_attempts: usize,
    reads: usize,
}

/// In-memory GPIO bank.
///
/// Pins read `High` until written or scripted. A scripted pin returns its
/// queued levels one per read, then falls back to its current level.
/// Writes set the current level unless the pin is stuck.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    state: Mutex<SimState>,
    latency: Mutex<Option<Duration>>,
}

impl SimulatedGpio {
    /// Creates an empty simulated bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current level of `pin`.
    pub fn set_level(&self, pin: PinId, level: Level) {
        self.state.lock().levels.insert(pin, level);
    }

    /// Returns the current level of `pin`.
    pub fn level(&self, pin: PinId) -> Level {
        self.state
            .lock()
            .levels
            .get(&pin)
            .copied()
            .unwrap_or(Level::High)
    }

    /// Queues levels to be returned by successive reads of `pin`.
    pub fn script<I>(&self, pin: PinId, levels: I)
    where
        I: IntoIterator<Item = Level>,
    {
        self.state
            .lock()
            .scripts
            .entry(pin)
            .or_default()
            .extend(levels);
    }

    /// Makes the next `count` reads of `pin` fail.
    pub fn fail_reads(&self, pin: PinId, count: u32) {
        *self.state.lock().read_failures.entry(pin).or_default() += count;
    }

    /// Makes the next `count` writes to `pin` fail.
    pub fn fail_writes(&self, pin: PinId, count: u32) {
        *self.state.lock().write_failures.entry(pin).or_default() += count;
    }

    /// Marks `pin` as stuck: writes are accepted but have no effect.
    pub fn set_stuck(&self, pin: PinId, stuck: bool) {
        let mut state = self.state.lock();
        if stuck {
            state.stuck.insert(pin);
        } else {
            state.stuck.remove(&pin);
        }
    }

    /// Delays every access by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Returns all accepted writes in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Returns accepted writes to `pin`.
    pub fn writes_to(&self, pin: PinId) -> Vec<Level> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.level)
            .collect()
    }

    /// Returns the number of write calls, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.state.lock().write_attempts
    }

    /// Returns the number of read calls, failed ones included.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn take_failure(failures: &mut HashMap<PinId, u32>, pin: PinId) -> bool {
    match failures.get_mut(&pin) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl GpioAccessor for SimulatedGpio {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read(&self, pin: PinId) -> GpioResult<Level> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.reads += 1;
        if take_failure(&mut state.read_failures, pin) {
            return Err(GpioError::unavailable(pin, GpioOp::Read, "injected read failure"));
        }
        if let Some(level) = state.scripts.get_mut(&pin).and_then(VecDeque::pop_front) {
            state.levels.insert(pin, level);
            return Ok(level);
        }
        Ok(state.levels.get(&pin).copied().unwrap_or(Level::High))
    }

    async fn write(&self, pin: PinId, level: Level) -> GpioResult<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.write_attempts += 1;
        if take_failure(&mut state.write_failures, pin) {
            return Err(GpioError::unavailable(pin, GpioOp::Write, "injected write failure"));
        }
        state.writes.push(WriteRecord { pin, level });
        if !state.stuck.contains(&pin) {
            state.levels.insert(pin, level);
        }
        Ok(())
    }
}
