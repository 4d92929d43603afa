//! Shared GPIO access layer for the gate GPIO watchdog.
//!
//! This crate provides everything that touches pin hardware:
//!
//! - [`gpio`]: the [`GpioAccessor`] capability trait plus the [`Level`] and
//!   [`PinId`] types the rest of the workspace speaks in
//! - [`backends`]: CLI helper backends (`raspi-gpio`, `pigs`) and an
//!   in-memory [`SimulatedGpio`]
//! - [`shell`]: bounded-latency execution of GPIO helper programs
//! - [`error`]: error types for hardware access
//!
//! # Example
//!
//! ```ignore
//! use gpio_watchdog_common::{GpioAccessor, Level, PinId, RaspiGpio};
//! use std::time::Duration;
//!
//! let gpio = RaspiGpio::new(Duration::from_secs(1));
//! if gpio.read(PinId::new(4)).await? == Level::Low {
//!     gpio.write(PinId::new(4), Level::High).await?;
//! }
//! ```

pub mod backends;
pub mod error;
pub mod gpio;
pub mod shell;

// Re-export commonly used items at crate root
pub use backends::{Pigs, RaspiGpio, SimulatedGpio, WriteRecord};
pub use error::{GpioError, GpioResult};
pub use gpio::{GpioAccessor, GpioOp, Level, PinId, MAX_BCM_PIN};
