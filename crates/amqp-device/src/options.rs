//! Option persistence model.
//!
//! Options are addressed by name. Scalar timeout options route to the child
//! that owns them; the `saved_*` names carry whole bags so a caller can
//! snapshot a device's option state and replay it into a recreated one.

use serde::{Deserialize, Serialize};

use crate::errors::DeviceError;

pub const OPTION_CBS_REQUEST_TIMEOUT_SECS: &str = "cbs_request_timeout_secs";
pub const OPTION_SAS_TOKEN_REFRESH_TIME_SECS: &str = "sas_token_refresh_time_secs";
pub const OPTION_SAS_TOKEN_LIFETIME_SECS: &str = "sas_token_lifetime_secs";
pub const OPTION_EVENT_SEND_TIMEOUT_SECS: &str = "event_send_timeout_secs";
pub const OPTION_SAVED_AUTH_OPTIONS: &str = "saved_device_auth_options";
pub const OPTION_SAVED_MESSENGER_OPTIONS: &str = "saved_device_messenger_options";
pub const OPTION_SAVED_DEVICE_OPTIONS: &str = "saved_device_options";

/// A single option value: either a scalar number of seconds or a nested bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
	Secs(u64),
	Bag(OptionBag),
}

/// Ordered collection of named option values.
///
/// Entries keep insertion order so replaying a bag feeds options back in the
/// order they were captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionBag {
	entries: Vec<(String, OptionValue)>,
}

impl OptionBag {
	#[must_use]
	pub fn new() -> Self {
		Self { entries: Vec::new() }
	}

	pub fn push(&mut self, name: impl Into<String>, value: OptionValue) {
		self.entries.push((name.into(), value));
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&OptionValue> {
		self.entries.iter().find(|(entry_name, _)| entry_name == name).map(|(_, value)| value)
	}

	pub fn entries(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
		self.entries.iter().map(|(name, value)| (name.as_str(), value))
	}

	#[must_use]
	pub fn into_entries(self) -> Vec<(String, OptionValue)> {
		self.entries
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Unwraps a bag-typed option value, failing for scalar values.
pub(crate) fn expect_bag(name: &str, value: OptionValue) -> Result<OptionBag, DeviceError> {
	match value {
		OptionValue::Bag(bag) => Ok(bag),
		OptionValue::Secs(_) => Err(DeviceError::InvalidOptionValue { name: name.to_string() }),
	}
}
