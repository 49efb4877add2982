//! Contract consumed from the CBS authentication worker.
//!
//! The authenticator is a black box to the controller: it is bound once at
//! create time with the device identity and an event handler, and from then
//! on is only started, stopped and cranked. Its progress is observed solely
//! through the events it reports back.

use std::sync::Arc;

use thiserror::Error;

use crate::config::DeviceCredentials;
use crate::core::router::AuthEventHandler;
use crate::options::{OptionBag, OptionValue};
use crate::types::CbsHandle;

/// Lifecycle state reported by the authentication worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
	Stopped,
	Starting,
	Started,
	Error,
}

/// Error classification reported by the authentication worker alongside its
/// `Error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
	None,
	AuthFailed,
	AuthTimeout,
}

#[derive(Error, Debug, Clone)]
pub enum AuthError {
	#[error("failed binding authenticator: {reason}")]
	Bind { reason: String },

	#[error("failed starting token authentication: {reason}")]
	Start { reason: String },

	#[error("failed stopping token authentication: {reason}")]
	Stop { reason: String },

	#[error("unsupported authentication option '{name}'")]
	UnsupportedOption { name: String },

	#[error("invalid value for authentication option '{name}'")]
	InvalidOptionValue { name: String },

	#[error("failed retrieving authentication options: {reason}")]
	RetrieveOptions { reason: String },
}

/// Create-time wiring handed to the authenticator: the device identity, the
/// credentials to authenticate with, and the handler it must invoke to
/// report state changes and error codes.
pub struct AuthBinding {
	pub device_id: Arc<str>,
	pub iothub_host_fqdn: Arc<str>,
	pub credentials: DeviceCredentials,
	pub events: AuthEventHandler,
}

/// CBS authentication worker driven by the device session.
///
/// Implementations progress only inside `do_work` and report transitions
/// through the bound [`AuthEventHandler`]; they must not call back into the
/// device from within any of these methods.
pub trait Authenticator {
	fn bind(&mut self, binding: AuthBinding) -> Result<(), AuthError>;

	/// Begins the token lifecycle on the given CBS channel. Non-blocking;
	/// completion is reported through the event handler.
	fn start(&mut self, cbs: CbsHandle) -> Result<(), AuthError>;

	fn stop(&mut self) -> Result<(), AuthError>;

	/// One bounded tick of authentication work.
	fn do_work(&mut self);

	fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), AuthError>;

	fn retrieve_options(&self) -> Result<OptionBag, AuthError>;
}
