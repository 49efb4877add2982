//! Contract consumed from the telemetry messenger.
//!
//! The messenger owns the AMQP send/receive links for one device. Like the
//! authenticator it is bound once at create time and then driven through
//! `start`/`stop`/`do_work`; sends, subscriptions and dispositions pass
//! through it in its own vocabulary, which the device translates at the
//! boundary.

use std::sync::Arc;

use thiserror::Error;

use crate::core::router::MessengerEventHandler;
use crate::options::{OptionBag, OptionValue};
use crate::types::{Message, SendStatus, SessionHandle};

/// Lifecycle state reported by the messenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessengerState {
	Stopped,
	Starting,
	Started,
	Stopping,
	Error,
}

/// Outcome the messenger reports for one submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessengerSendResult {
	Ok,
	CannotParse,
	FailSending,
	Timeout,
	MessengerDestroyed,
}

/// Messenger-facing settlement verdict for a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessengerDispositionResult {
	None,
	Accepted,
	Rejected,
	Released,
}

/// Messenger-facing descriptor of a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDispositionInfo {
	pub source: String,
	pub message_id: u64,
}

/// Invoked by the messenger exactly once per accepted submission.
pub type OnMessengerSendComplete = Box<dyn FnOnce(&Message, MessengerSendResult) + Send>;

/// Invoked by the messenger per delivered message; returns the verdict to
/// settle it with.
pub type OnMessengerMessageReceived = Box<dyn FnMut(&Message, &MessageDispositionInfo) -> MessengerDispositionResult + Send>;

#[derive(Error, Debug, Clone)]
pub enum MessengerError {
	#[error("failed binding messenger: {reason}")]
	Bind { reason: String },

	#[error("failed starting messenger: {reason}")]
	Start { reason: String },

	#[error("failed stopping messenger: {reason}")]
	Stop { reason: String },

	#[error("failed submitting message: {reason}")]
	Send { reason: String },

	#[error("failed reading send status: {reason}")]
	SendStatus { reason: String },

	#[error("failed subscribing for messages: {reason}")]
	Subscribe { reason: String },

	#[error("failed unsubscribing from messages: {reason}")]
	Unsubscribe { reason: String },

	#[error("failed settling message disposition: {reason}")]
	Disposition { reason: String },

	#[error("unsupported messenger option '{name}'")]
	UnsupportedOption { name: String },

	#[error("invalid value for messenger option '{name}'")]
	InvalidOptionValue { name: String },

	#[error("failed retrieving messenger options: {reason}")]
	RetrieveOptions { reason: String },
}

/// Create-time wiring handed to the messenger.
pub struct MessengerBinding {
	pub device_id: Arc<str>,
	pub iothub_host_fqdn: Arc<str>,
	pub events: MessengerEventHandler,
}

/// Telemetry messenger driven by the device session.
///
/// Contract notes:
/// - a rejected `send_async` must drop the completion callback without
///   invoking it;
/// - every pending send must be completed with `MessengerDestroyed` when the
///   messenger is dropped, so that callers observe exactly one completion
///   per accepted submission;
/// - implementations must not call back into the device from within any of
///   these methods.
pub trait Messenger {
	fn bind(&mut self, binding: MessengerBinding) -> Result<(), MessengerError>;

	/// Attaches the links on the given session. Non-blocking; completion is
	/// reported through the event handler.
	fn start(&mut self, session: SessionHandle) -> Result<(), MessengerError>;

	fn stop(&mut self) -> Result<(), MessengerError>;

	/// One bounded tick of messenger work. Send completions and message
	/// deliveries fire from inside this call.
	fn do_work(&mut self);

	fn send_async(&mut self, message: Message, on_complete: OnMessengerSendComplete) -> Result<(), MessengerError>;

	fn get_send_status(&self) -> Result<SendStatus, MessengerError>;

	fn subscribe(&mut self, on_message: OnMessengerMessageReceived) -> Result<(), MessengerError>;

	fn unsubscribe(&mut self) -> Result<(), MessengerError>;

	fn send_message_disposition(&mut self, info: &MessageDispositionInfo, result: MessengerDispositionResult) -> Result<(), MessengerError>;

	fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), MessengerError>;

	fn retrieve_options(&self) -> Result<OptionBag, MessengerError>;
}
