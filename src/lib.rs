//! # Sense HAT Bridge
//!
//! A C-callable bridge to the Raspberry Pi Sense HAT add-on board. The board is driven through
//! the `sense_hat` Python library running inside an embedded interpreter; this crate owns the
//! interpreter lifecycle, resolves the library's callables once, and marshals plain data
//! (pixels, orientation vectors, joystick events) across the boundary.
//!
//! ## Features
//!
//! - **LED matrix**: rotation, flips, per-pixel and whole-matrix access, image loading,
//!   scrolling text and single letters, gamma reset
//! - **Sensors**: humidity, pressure, temperature, orientation, compass, gyroscope, accelerometer
//! - **Joystick**: event draining and blocking wait
//! - **C ABI**: `SenseHAT_*` functions returning POSIX-style status codes
//!
//! ## Backends
//!
//! - `python` feature: pyo3-backed [`scripting::PythonRuntime`]
//! - always available: [`scripting::SimulatedRuntime`], an in-process model of the board
//!
//! ### Example
//!
//! ```
//! use std::sync::Arc;
//! use sense_hat_bridge::device::{PixelColor, SenseHat};
//! use sense_hat_bridge::scripting::{RuntimeContext, SimulatedRuntime};
//!
//! let context = Arc::new(RuntimeContext::new(SimulatedRuntime::new()));
//! let hat = SenseHat::open(context).unwrap();
//! hat.set_pixel(0, 0, Some(PixelColor::new(255, 0, 0))).unwrap();
//! assert_eq!(hat.get_pixel(0, 0).unwrap(), PixelColor::new(248, 0, 0));
//! hat.close().unwrap();
//! ```

/// Error types, logging and version information
pub mod core;
/// Configuration loading (TOML/JSON files, environment overrides)
pub mod config;
/// Embedded runtime abstraction and backends
pub mod scripting;
/// Device handle and Sense HAT operations
pub mod device;
/// C ABI surface
pub mod ffi;

pub use crate::core::{version, BridgeError, BridgeResult};
pub use config::BridgeConfig;
pub use device::SenseHat;
