//! Aggregate state machine for one device session.
//!
//! The device reconciles the authentication worker and the messenger into a
//! single lifecycle. Everything is single-threaded cooperative: the children
//! progress only when the caller pumps `do_work`, and every callback to the
//! caller fires synchronously from inside one of the public operations.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::auth::{AuthBinding, AuthError, AuthErrorCode, AuthState, Authenticator};
use crate::clock::Clock;
use crate::config::{AuthMode, DeviceConfig};
use crate::core::c2d::{self, MessageHandlerSlot};
use crate::core::router::{AuthEventHandler, ChildViews, MessengerEventHandler};
use crate::core::send_task::SendTask;
use crate::core::{disposition, lock};
use crate::errors::DeviceError;
use crate::messenger::{Messenger, MessengerBinding, MessengerError, MessengerState};
use crate::options::{self, OptionBag, OptionValue};
use crate::types::{CbsHandle, DeviceState, DispositionInfo, DispositionResult, Message, OnMessageReceived, OnSendComplete, RetryPolicy, SendStatus, SessionHandle};

const DEFAULT_AUTH_STATE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MSGR_STATE_TIMEOUT_SECS: u64 = 60;

/// Session controller for a single logical IoT device.
///
/// Owns the two child subsystems and a cached view of their latest reported
/// states. The caller drives progress by invoking [`Device::do_work`]
/// periodically; error states are terminal until the device is dropped and
/// recreated.
pub struct Device<A: Authenticator, M: Messenger> {
	device_id: Arc<str>,
	config: DeviceConfig,
	state: DeviceState,

	session: Option<SessionHandle>,
	cbs: Option<CbsHandle>,

	// Field order matters: the messenger must be torn down before the
	// authenticator at drop.
	messenger: M,
	authenticator: Option<A>,

	views: Arc<ChildViews>,
	clock: Arc<dyn Clock>,
	auth_timeout_secs: u64,
	msgr_timeout_secs: u64,

	message_handler: MessageHandlerSlot,
}

impl<A: Authenticator, M: Messenger> Device<A, M> {
	/// Validates the configuration, binds the children and returns a stopped
	/// device. A CBS-mode device requires an authenticator; an X509-mode
	/// device must not be given one. No state-change callback fires here.
	pub fn create(config: DeviceConfig, authenticator: Option<A>, mut messenger: M, clock: Arc<dyn Clock>) -> Result<Self, DeviceError> {
		config.validate()?;

		let device_id: Arc<str> = Arc::from(config.device_id.as_str());
		let iothub_host_fqdn: Arc<str> = Arc::from(config.iothub_host_fqdn.as_str());
		let views = Arc::new(ChildViews::new());

		let authenticator = match (&config.auth_mode, authenticator) {
			(AuthMode::Cbs(credentials), Some(mut auth)) => {
				auth.bind(AuthBinding {
					device_id: Arc::clone(&device_id),
					iothub_host_fqdn: Arc::clone(&iothub_host_fqdn),
					credentials: credentials.clone(),
					events: AuthEventHandler::new(Arc::clone(&views), Arc::clone(&clock), Arc::clone(&device_id)),
				})
				.map_err(|e| {
					error!(device_id = %device_id, err = %e, "Failed creating device (authenticator bind failed)");
					DeviceError::from(e)
				})?;
				Some(auth)
			}
			(AuthMode::Cbs(_), None) => {
				error!(device_id = %device_id, "Failed creating device (CBS authentication requires an authenticator)");
				return Err(DeviceError::InvalidConfig {
					reason: "CBS authentication requires an authenticator".to_string(),
				});
			}
			(AuthMode::X509, None) => None,
			(AuthMode::X509, Some(_)) => {
				error!(device_id = %device_id, "Failed creating device (authenticator provided but device does not use CBS)");
				return Err(DeviceError::InvalidConfig {
					reason: "authenticator provided but device does not use CBS".to_string(),
				});
			}
		};

		messenger
			.bind(MessengerBinding {
				device_id: Arc::clone(&device_id),
				iothub_host_fqdn,
				events: MessengerEventHandler::new(Arc::clone(&views), Arc::clone(&clock), Arc::clone(&device_id)),
			})
			.map_err(|e| {
				error!(device_id = %device_id, err = %e, "Failed creating device (messenger bind failed)");
				DeviceError::from(e)
			})?;

		info!(device_id = %device_id, "device session created");

		Ok(Self {
			device_id,
			config,
			state: DeviceState::Stopped,
			session: None,
			cbs: None,
			authenticator,
			messenger,
			views,
			clock,
			auth_timeout_secs: DEFAULT_AUTH_STATE_TIMEOUT_SECS,
			msgr_timeout_secs: DEFAULT_MSGR_STATE_TIMEOUT_SECS,
			message_handler: Arc::new(Mutex::new(None)),
		})
	}

	#[must_use]
	pub fn state(&self) -> DeviceState {
		self.state
	}

	#[must_use]
	pub fn device_id(&self) -> &str {
		&self.device_id
	}

	/// Stores the session and CBS handles and transitions to `Starting`.
	///
	/// Non-blocking: the child start primitives are issued by the next
	/// `do_work` tick, never from here.
	pub fn start_async(&mut self, session: SessionHandle, cbs: Option<CbsHandle>) -> Result<(), DeviceError> {
		if self.state != DeviceState::Stopped {
			error!(device_id = %self.device_id, state = %self.state, "Failed starting device (device is not stopped)");
			return Err(DeviceError::InvalidState { state: self.state });
		}
		if self.config.uses_cbs() && cbs.is_none() {
			error!(device_id = %self.device_id, "Failed starting device (device uses CBS authentication, but no CBS handle was provided)");
			return Err(DeviceError::MissingCbsHandle);
		}

		self.session = Some(session);
		self.cbs = cbs;
		self.update_state(DeviceState::Starting);

		Ok(())
	}

	/// Stops the messenger and then the authentication worker, synchronously.
	///
	/// A child stop failure transitions into the corresponding error state
	/// and fails the call; on success the device ends up `Stopped`.
	pub fn stop(&mut self) -> Result<(), DeviceError> {
		if matches!(self.state, DeviceState::Stopped | DeviceState::Stopping) {
			error!(device_id = %self.device_id, state = %self.state, "Failed stopping device (device is already stopped or stopping)");
			return Err(DeviceError::InvalidState { state: self.state });
		}

		self.update_state(DeviceState::Stopping);

		let msgr_state = self.views.messenger().state;
		if msgr_state != MessengerState::Stopped && msgr_state != MessengerState::Stopping {
			if let Err(e) = self.messenger.stop() {
				error!(device_id = %self.device_id, err = %e, "Failed stopping device (messenger stop failed)");
				self.update_state(DeviceState::ErrorMsg);
				return Err(DeviceError::from(e));
			}
		}

		let auth_state = self.views.auth().state;
		if let Some(auth) = self.authenticator.as_mut() {
			if auth_state != AuthState::Stopped {
				if let Err(e) = auth.stop() {
					error!(device_id = %self.device_id, err = %e, "Failed stopping device (authentication stop failed)");
					self.update_state(DeviceState::ErrorAuth);
					return Err(DeviceError::from(e));
				}
			}
		}

		self.update_state(DeviceState::Stopped);
		Ok(())
	}

	/// One tick of the pump.
	///
	/// Evaluates the aggregate state machine (authentication strictly before
	/// the messenger), then cranks each child whose cached view is neither
	/// `Stopped` nor `Error`.
	pub fn do_work(&mut self) {
		match self.state {
			DeviceState::Starting => self.manage_starting(),
			DeviceState::Started => self.manage_started(),
			_ => {}
		}

		let auth_state = self.views.auth().state;
		if auth_state != AuthState::Stopped && auth_state != AuthState::Error {
			if let Some(auth) = self.authenticator.as_mut() {
				auth.do_work();
			}
		}

		let msgr_state = self.views.messenger().state;
		if msgr_state != MessengerState::Stopped && msgr_state != MessengerState::Error {
			self.messenger.do_work();
		}
	}

	fn manage_starting(&mut self) {
		let auth_view = self.views.auth();

		if self.config.uses_cbs() {
			match auth_view.state {
				AuthState::Stopped => {
					let started = match (self.authenticator.as_mut(), self.cbs.clone()) {
						(Some(auth), Some(cbs)) => auth.start(cbs),
						_ => Err(AuthError::Start {
							reason: "missing authenticator or CBS handle".to_string(),
						}),
					};
					if let Err(e) = started {
						error!(device_id = %self.device_id, err = %e, "Failed to authenticate device (authentication start failed)");
						self.update_state(DeviceState::ErrorAuth);
					}
				}
				AuthState::Starting => match timeout_reached(self.clock.as_ref(), auth_view.last_changed, self.auth_timeout_secs) {
					None => {
						error!(device_id = %self.device_id, "Failed verifying the timeout for authentication start");
						self.update_state(DeviceState::ErrorAuth);
					}
					Some(true) => {
						error!(
							device_id = %self.device_id,
							timeout_secs = self.auth_timeout_secs,
							"Authentication did not complete starting within the expected timeout"
						);
						self.update_state(DeviceState::ErrorAuthTimeout);
					}
					Some(false) => {}
				},
				AuthState::Error => {
					if auth_view.error_code == AuthErrorCode::AuthFailed {
						self.update_state(DeviceState::ErrorAuth);
					} else {
						self.update_state(DeviceState::ErrorAuthTimeout);
					}
				}
				AuthState::Started => {}
			}
		}

		// The messenger is gated on authentication, not on the aggregate
		// state: it is never started while a CBS device is unauthenticated.
		if !self.config.uses_cbs() || auth_view.state == AuthState::Started {
			let msgr_view = self.views.messenger();
			match msgr_view.state {
				MessengerState::Stopped => {
					let started = match self.session.clone() {
						Some(session) => self.messenger.start(session),
						None => Err(MessengerError::Start {
							reason: "missing session handle".to_string(),
						}),
					};
					if let Err(e) = started {
						error!(device_id = %self.device_id, err = %e, "Failed to start device messenger (messenger start failed)");
						self.update_state(DeviceState::ErrorMsg);
					}
				}
				MessengerState::Starting => match timeout_reached(self.clock.as_ref(), msgr_view.last_changed, self.msgr_timeout_secs) {
					None => {
						error!(device_id = %self.device_id, "Failed verifying the timeout for messenger start");
						self.update_state(DeviceState::ErrorMsg);
					}
					Some(true) => {
						error!(
							device_id = %self.device_id,
							timeout_secs = self.msgr_timeout_secs,
							"Messenger did not complete starting within the expected timeout"
						);
						self.update_state(DeviceState::ErrorMsg);
					}
					Some(false) => {}
				},
				MessengerState::Error => {
					error!(device_id = %self.device_id, "Failed to start device messenger (messenger got into error state)");
					self.update_state(DeviceState::ErrorMsg);
				}
				MessengerState::Started => {
					self.update_state(DeviceState::Started);
				}
				MessengerState::Stopping => {}
			}
		}
	}

	fn manage_started(&mut self) {
		let auth_view = self.views.auth();

		if self.config.uses_cbs() && auth_view.state != AuthState::Started {
			error!(device_id = %self.device_id, auth_state = ?auth_view.state, "Device is started but authentication reported an unexpected state");
			if auth_view.state != AuthState::Error {
				if auth_view.error_code == AuthErrorCode::AuthFailed {
					self.update_state(DeviceState::ErrorAuth);
				} else {
					self.update_state(DeviceState::ErrorAuthTimeout);
				}
			} else {
				self.update_state(DeviceState::ErrorAuth);
			}
		} else {
			let msgr_state = self.views.messenger().state;
			if msgr_state != MessengerState::Started {
				error!(device_id = %self.device_id, msgr_state = ?msgr_state, "Device is started but messenger reported an unexpected state");
				self.update_state(DeviceState::ErrorMsg);
			}
		}
	}

	/// Submits a telemetry message. The completion callback, when given,
	/// fires exactly once, from inside a later `do_work` tick or at drop.
	pub fn send_event_async(&mut self, message: Message, on_complete: Option<OnSendComplete>) -> Result<(), DeviceError> {
		let task = SendTask::new(on_complete);

		self.messenger.send_async(message, task.into_messenger_callback()).map_err(|e| {
			error!(device_id = %self.device_id, err = %e, "Failed sending event (messenger send failed)");
			DeviceError::from(e)
		})
	}

	pub fn get_send_status(&self) -> Result<SendStatus, DeviceError> {
		self.messenger.get_send_status().map_err(|e| {
			error!(device_id = %self.device_id, err = %e, "Failed getting the device messenger send status");
			DeviceError::from(e)
		})
	}

	/// Registers for cloud-to-device messages. Deliveries are routed to
	/// `on_message` and its verdict is returned to the messenger.
	pub fn subscribe_message(&mut self, on_message: OnMessageReceived) -> Result<(), DeviceError> {
		let slot = Arc::clone(&self.message_handler);
		let device_id = Arc::clone(&self.device_id);

		self.messenger
			.subscribe(Box::new(move |message, info| c2d::dispatch(&slot, &device_id, message, info)))
			.map_err(|e| {
				error!(device_id = %self.device_id, err = %e, "Failed subscribing to incoming messages");
				DeviceError::from(e)
			})?;

		*lock(&self.message_handler) = Some(on_message);
		Ok(())
	}

	/// Stops message deliveries. The registered callback is kept; no further
	/// deliveries can reach it anyway.
	pub fn unsubscribe_message(&mut self) -> Result<(), DeviceError> {
		self.messenger.unsubscribe().map_err(|e| {
			error!(device_id = %self.device_id, err = %e, "Failed unsubscribing from incoming messages");
			DeviceError::from(e)
		})
	}

	/// Settles a previously delivered message with the given verdict.
	pub fn send_message_disposition(&mut self, info: &DispositionInfo, result: DispositionResult) -> Result<(), DeviceError> {
		if info.source.is_empty() {
			error!(device_id = %self.device_id, "Failed sending message disposition (disposition source is empty)");
			return Err(DeviceError::EmptyDispositionSource);
		}

		let messenger_info = disposition::to_messenger_info(info);
		let messenger_result = disposition::to_messenger_result(result);

		self.messenger.send_message_disposition(&messenger_info, messenger_result).map_err(|e| {
			error!(device_id = %self.device_id, err = %e, "Failed sending message disposition");
			DeviceError::from(e)
		})
	}

	/// Retry is a concern of the layer above; this always fails.
	pub fn set_retry_policy(&mut self, _policy: RetryPolicy, _retry_timeout_limit_secs: u64) -> Result<(), DeviceError> {
		error!(device_id = %self.device_id, "Failed setting retry policy (functionality not supported)");
		Err(DeviceError::RetryNotSupported)
	}

	/// Routes a named option to its owner: the scalar timeout options go to
	/// the owning child, the `saved_*` bags are replayed entry by entry into
	/// their target.
	pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), DeviceError> {
		match name {
			options::OPTION_CBS_REQUEST_TIMEOUT_SECS | options::OPTION_SAS_TOKEN_REFRESH_TIME_SECS | options::OPTION_SAS_TOKEN_LIFETIME_SECS => {
				let Some(auth) = self.authenticator.as_mut() else {
					error!(device_id = %self.device_id, option = name, "Failed setting option (not using CBS authentication)");
					return Err(DeviceError::AuthOptionWithoutCbs { name: name.to_string() });
				};
				auth.set_option(name, value).map_err(|e| {
					error!(device_id = %self.device_id, option = name, err = %e, "Failed setting authentication option");
					DeviceError::from(e)
				})
			}
			options::OPTION_EVENT_SEND_TIMEOUT_SECS => self.messenger.set_option(name, value).map_err(|e| {
				error!(device_id = %self.device_id, option = name, err = %e, "Failed setting messenger option");
				DeviceError::from(e)
			}),
			options::OPTION_SAVED_AUTH_OPTIONS => {
				let bag = options::expect_bag(name, value)?;
				let Some(auth) = self.authenticator.as_mut() else {
					error!(device_id = %self.device_id, option = name, "Failed setting option (not using CBS authentication)");
					return Err(DeviceError::AuthOptionWithoutCbs { name: name.to_string() });
				};
				for (entry_name, entry_value) in bag.into_entries() {
					auth.set_option(&entry_name, entry_value).map_err(|e| {
						error!(device_id = %self.device_id, option = %entry_name, err = %e, "Failed replaying saved authentication option");
						DeviceError::from(e)
					})?;
				}
				Ok(())
			}
			options::OPTION_SAVED_MESSENGER_OPTIONS => {
				let bag = options::expect_bag(name, value)?;
				for (entry_name, entry_value) in bag.into_entries() {
					self.messenger.set_option(&entry_name, entry_value).map_err(|e| {
						error!(device_id = %self.device_id, option = %entry_name, err = %e, "Failed replaying saved messenger option");
						DeviceError::from(e)
					})?;
				}
				Ok(())
			}
			options::OPTION_SAVED_DEVICE_OPTIONS => {
				let bag = options::expect_bag(name, value)?;
				for (entry_name, entry_value) in bag.into_entries() {
					self.set_option(&entry_name, entry_value)?;
				}
				Ok(())
			}
			_ => {
				error!(device_id = %self.device_id, option = name, "Failed setting option (option is not supported)");
				Err(DeviceError::UnsupportedOption { name: name.to_string() })
			}
		}
	}

	/// Captures the option state of this device and its children as one
	/// composite bag, replayable through `set_option(saved_device_options)`.
	pub fn retrieve_options(&self) -> Result<OptionBag, DeviceError> {
		let mut bag = OptionBag::new();

		if let Some(auth) = self.authenticator.as_ref() {
			let auth_bag = auth.retrieve_options().map_err(|e| {
				error!(device_id = %self.device_id, err = %e, "Failed retrieving authentication options");
				DeviceError::from(e)
			})?;
			bag.push(options::OPTION_SAVED_AUTH_OPTIONS, OptionValue::Bag(auth_bag));
		}

		let messenger_bag = self.messenger.retrieve_options().map_err(|e| {
			error!(device_id = %self.device_id, err = %e, "Failed retrieving messenger options");
			DeviceError::from(e)
		})?;
		bag.push(options::OPTION_SAVED_MESSENGER_OPTIONS, OptionValue::Bag(messenger_bag));

		Ok(bag)
	}

	fn update_state(&mut self, new_state: DeviceState) {
		if new_state == self.state {
			return;
		}

		let previous = self.state;
		self.state = new_state;
		debug!(device_id = %self.device_id, %previous, state = %new_state, "device state changed");

		(self.config.on_state_changed)(previous, new_state);
	}
}

impl<A: Authenticator, M: Messenger> Drop for Device<A, M> {
	fn drop(&mut self) {
		if matches!(self.state, DeviceState::Starting | DeviceState::Started) {
			let _ = self.stop();
		}
	}
}

fn timeout_reached(clock: &dyn Clock, since: Option<DateTime<Utc>>, timeout_secs: u64) -> Option<bool> {
	let start = since?;
	let now = clock.now()?;
	let elapsed = now.signed_duration_since(start).num_seconds();
	Some(elapsed >= i64::try_from(timeout_secs).unwrap_or(i64::MAX))
}
