//! Steplog: dual-mode structured recording for simulation step functions
//!
//! A step function handed to a solver is called many times to advance
//! state, and separately at checkpoints to find out what happened inside it.
//! Steplog lets one body serve both purposes: it runs as ordinary code during
//! integration and, when called in recording mode, also builds a nested
//! [`Record`] of selected intermediate values without computing anything
//! twice.
//!
//! # Writing a dual-mode function
//!
//! The [`loggable`] attribute generates both forms from one body:
//!
//! ```rust
//! use steplog_core::{loggable, Value};
//!
//! #[loggable]
//! fn control(theta: f64, gain: f64) -> f64 {
//!     log!(torque = -gain * theta);
//!     torque
//! }
//!
//! #[loggable]
//! fn dynamics(theta: f64, omega: f64) -> (f64, f64) {
//!     let u = nested_log!(controller: control(theta, 2.0));
//!     only_log!(energy = 0.5 * omega * omega);
//!     (omega, -theta.sin() + u)
//! }
//!
//! // Plain form: ordinary value, nothing recorded
//! let (dtheta, _) = dynamics(0.1, 0.3);
//! assert_eq!(dtheta, 0.3);
//!
//! // Recording form: the record
//! let record = dynamics_recorded(0.1, 0.3).unwrap();
//! assert_eq!(record.get_path("controller.torque").unwrap(), Some(&Value::Float(-0.2)));
//! ```
//!
//! For each `#[loggable] fn name` the attribute emits:
//!
//! - `name(..)`: plain form, original signature and return value;
//! - `name_recorded(..) -> Result<Record>`: recording form;
//! - `name_traced(..) -> Result<(T, Record)>`: value and record together;
//! - `name_with_context(.., &mut Context<'_>) -> Result<T>`: the form nested
//!   operations call, sharing the caller's context.
//!
//! # Without the attribute
//!
//! A hand-written function taking `&mut Context<'_>` is a dual-mode function
//! too; [`call_plain`], [`call_recording`] and [`call_traced`] provide the
//! entry points and the [`Context`] methods are the record operations.
//!
//! # Drivers
//!
//! [`sample`] and [`sample_with_config`] call a step function in recording
//! mode at each sample point and collect a [`Trajectory`].

pub mod config;
pub mod context;
pub mod errors;
pub mod record;
pub mod trajectory;
pub mod value;

pub use config::{SampleSchedule, SamplingConfig};
pub use context::{call_plain, call_recording, call_traced, Context};
pub use errors::{RecordError, Result};
pub use record::{merge, Record, PATH_SEPARATOR};
pub use trajectory::{sample, sample_with_config, Sample, Trajectory};
pub use value::{ToValue, Value};

/// Turn a function body containing record operations into a dual-mode
/// function. See the crate documentation for the generated forms.
pub use steplog_macros::loggable;
