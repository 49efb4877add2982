use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Aggregate lifecycle state of a device session.
///
/// Error states are terminal until the device is dropped and recreated;
/// there is no in-place recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
	Stopped,
	Starting,
	Started,
	Stopping,
	ErrorAuth,
	ErrorAuthTimeout,
	ErrorMsg,
}

impl fmt::Display for DeviceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeviceState::Stopped => write!(f, "stopped"),
			DeviceState::Starting => write!(f, "starting"),
			DeviceState::Started => write!(f, "started"),
			DeviceState::Stopping => write!(f, "stopping"),
			DeviceState::ErrorAuth => write!(f, "error(auth)"),
			DeviceState::ErrorAuthTimeout => write!(f, "error(auth-timeout)"),
			DeviceState::ErrorMsg => write!(f, "error(messenger)"),
		}
	}
}

/// Opaque token for an opened AMQP session, borrowed from the caller.
///
/// The device keeps a clone between `start_async` and teardown and never
/// closes the underlying session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(Arc<str>);

impl SessionHandle {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Opaque token for a CBS channel, borrowed from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CbsHandle(Arc<str>);

impl CbsHandle {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for CbsHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Telemetry message carried through the messenger. Opaque to the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
	pub body: Vec<u8>,
	pub properties: BTreeMap<String, String>,
}

impl Message {
	#[must_use]
	pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
		Self {
			body: body.into(),
			properties: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.properties.insert(key.into(), value.into());
		self
	}
}

/// Caller-facing descriptor of a received message, used to settle it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionInfo {
	pub source: String,
	pub message_id: u64,
}

/// Caller verdict for a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionResult {
	None,
	Accepted,
	Rejected,
	Released,
}

/// Caller-facing outcome of a device-to-cloud send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum D2cSendResult {
	Ok,
	CannotParse,
	FailSending,
	Timeout,
	DeviceDestroyed,
	Unknown,
}

/// Whether the messenger has events queued or in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
	Idle,
	Busy,
}

/// Retry policies of the upper transport layer. Not supported here;
/// `set_retry_policy` always fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
	None,
	Immediate,
	Interval,
	LinearBackoff,
	ExponentialBackoff,
	ExponentialBackoffWithJitter,
}

/// Invoked once per distinct aggregate state transition, with (previous, new).
pub type OnStateChanged = Box<dyn FnMut(DeviceState, DeviceState) + Send>;

/// Invoked exactly once per submitted message that was accepted for sending.
pub type OnSendComplete = Box<dyn FnOnce(&Message, D2cSendResult) + Send>;

/// Invoked per inbound message while subscribed; returns the settlement verdict.
pub type OnMessageReceived = Box<dyn FnMut(&Message, &DispositionInfo) -> DispositionResult + Send>;
