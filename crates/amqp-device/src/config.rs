use std::fmt;

use crate::errors::DeviceError;
use crate::types::OnStateChanged;

/// Credentials used by the CBS authentication worker.
///
/// Either a pre-built SAS token or the symmetric key pair it is derived
/// from; holding both at once is unrepresentable.
#[derive(Clone, PartialEq, Eq)]
pub enum DeviceCredentials {
	SasToken(String),
	SymmetricKeys { primary: String, secondary: String },
}

impl fmt::Debug for DeviceCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeviceCredentials::SasToken(_) => write!(f, "SasToken([REDACTED])"),
			DeviceCredentials::SymmetricKeys { .. } => write!(f, "SymmetricKeys([REDACTED])"),
		}
	}
}

/// How the device proves its identity to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
	/// Claims-based security over a dedicated CBS channel.
	Cbs(DeviceCredentials),
	/// Client-certificate authentication handled below this layer.
	X509,
}

/// Immutable identity of one logical device, fixed at create.
pub struct DeviceConfig {
	pub device_id: String,
	pub iothub_host_fqdn: String,
	pub auth_mode: AuthMode,
	pub on_state_changed: OnStateChanged,
}

impl DeviceConfig {
	pub fn new(device_id: impl Into<String>, iothub_host_fqdn: impl Into<String>, auth_mode: AuthMode, on_state_changed: OnStateChanged) -> Self {
		Self {
			device_id: device_id.into(),
			iothub_host_fqdn: iothub_host_fqdn.into(),
			auth_mode,
			on_state_changed,
		}
	}

	#[must_use]
	pub fn uses_cbs(&self) -> bool {
		matches!(self.auth_mode, AuthMode::Cbs(_))
	}

	pub(crate) fn validate(&self) -> Result<(), DeviceError> {
		if self.device_id.is_empty() {
			return Err(DeviceError::InvalidConfig {
				reason: "device_id is empty".to_string(),
			});
		}
		if self.iothub_host_fqdn.is_empty() {
			return Err(DeviceError::InvalidConfig {
				reason: "iothub_host_fqdn is empty".to_string(),
			});
		}
		Ok(())
	}
}

impl fmt::Debug for DeviceConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeviceConfig")
			.field("device_id", &self.device_id)
			.field("iothub_host_fqdn", &self.iothub_host_fqdn)
			.field("auth_mode", &self.auth_mode)
			.finish_non_exhaustive()
	}
}
