use thiserror::Error;

use crate::auth::AuthError;
use crate::messenger::MessengerError;
use crate::types::DeviceState;

#[derive(Error, Debug)]
pub enum DeviceError {
	#[error("invalid device configuration: {reason}")]
	InvalidConfig { reason: String },

	#[error("operation not allowed while device is {state}")]
	InvalidState { state: DeviceState },

	#[error("device uses CBS authentication but no CBS handle was provided")]
	MissingCbsHandle,

	#[error("message disposition info has an empty source")]
	EmptyDispositionSource,

	#[error("retry policies are not supported at this layer")]
	RetryNotSupported,

	#[error("unsupported device option '{name}'")]
	UnsupportedOption { name: String },

	#[error("option '{name}' targets authentication but device does not use CBS")]
	AuthOptionWithoutCbs { name: String },

	#[error("invalid value for device option '{name}'")]
	InvalidOptionValue { name: String },

	#[error("authentication failure: {0}")]
	Auth(#[from] AuthError),

	#[error("messenger failure: {0}")]
	Messenger(#[from] MessengerError),
}
