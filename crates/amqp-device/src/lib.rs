// amqp-device
//
// Session controller for a single logical IoT device over an AMQP
// connection. It drives a CBS authentication worker and a telemetry
// messenger as one aggregate state machine: the caller starts the device,
// pumps `do_work`, and observes a single state stream plus send-completion
// and message-delivery callbacks.
//
// The controller is single-threaded cooperative. It spawns no tasks and
// holds no timers; children progress only inside the caller's `do_work`
// tick, and every callback fires synchronously from a caller invocation.

pub mod auth;
pub mod clock;
pub mod config;
pub mod core;
pub mod errors;
pub mod messenger;
pub mod options;
pub mod types;

pub use crate::clock::{Clock, SystemClock};
pub use crate::config::{AuthMode, DeviceConfig, DeviceCredentials};
pub use crate::core::device::Device;
pub use crate::core::router::{AuthEventHandler, MessengerEventHandler};
pub use crate::errors::DeviceError;
pub use crate::types::{CbsHandle, DeviceState, Message, SessionHandle};
