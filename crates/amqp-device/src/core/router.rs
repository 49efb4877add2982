//! Event routing between the child subsystems and the device session.
//!
//! The children report state changes and error codes through the handlers
//! below; the handlers only update cached views, which the device reads at
//! the top of each `do_work` tick. Nothing here transitions the aggregate
//! state.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::auth::{AuthErrorCode, AuthState};
use crate::clock::Clock;
use crate::core::lock;
use crate::messenger::MessengerState;

/// Latest values reported by the authentication worker.
#[derive(Debug, Clone)]
pub(crate) struct AuthView {
	pub state: AuthState,
	pub error_code: AuthErrorCode,
	pub last_changed: Option<DateTime<Utc>>,
}

/// Latest values reported by the messenger.
#[derive(Debug, Clone)]
pub(crate) struct MessengerView {
	pub state: MessengerState,
	pub last_changed: Option<DateTime<Utc>>,
}

/// Cached child views shared between the device and the event handlers.
pub(crate) struct ChildViews {
	auth: Mutex<AuthView>,
	messenger: Mutex<MessengerView>,
}

impl ChildViews {
	pub fn new() -> Self {
		Self {
			auth: Mutex::new(AuthView {
				state: AuthState::Stopped,
				error_code: AuthErrorCode::None,
				last_changed: None,
			}),
			messenger: Mutex::new(MessengerView {
				state: MessengerState::Stopped,
				last_changed: None,
			}),
		}
	}

	pub fn auth(&self) -> AuthView {
		lock(&self.auth).clone()
	}

	pub fn messenger(&self) -> MessengerView {
		lock(&self.messenger).clone()
	}
}

/// Handle the authentication worker uses to report back to the device.
#[derive(Clone)]
pub struct AuthEventHandler {
	views: Arc<ChildViews>,
	clock: Arc<dyn Clock>,
	device_id: Arc<str>,
}

impl AuthEventHandler {
	pub(crate) fn new(views: Arc<ChildViews>, clock: Arc<dyn Clock>, device_id: Arc<str>) -> Self {
		Self { views, clock, device_id }
	}

	/// Records a state transition. Same-state repeats are ignored.
	pub fn state_changed(&self, previous: AuthState, new: AuthState) {
		if new == previous {
			return;
		}

		let stamped = self.clock.now();
		if stamped.is_none() {
			warn!(device_id = %self.device_id, "failed to timestamp authentication state change (clock read failed)");
		}

		let mut view = lock(&self.views.auth);
		view.state = new;
		view.last_changed = stamped;
	}

	/// Records the latest error code without transitioning any state.
	pub fn error_reported(&self, code: AuthErrorCode) {
		lock(&self.views.auth).error_code = code;
	}
}

/// Handle the messenger uses to report state changes to the device.
#[derive(Clone)]
pub struct MessengerEventHandler {
	views: Arc<ChildViews>,
	clock: Arc<dyn Clock>,
	device_id: Arc<str>,
}

impl MessengerEventHandler {
	pub(crate) fn new(views: Arc<ChildViews>, clock: Arc<dyn Clock>, device_id: Arc<str>) -> Self {
		Self { views, clock, device_id }
	}

	/// Records a state transition. Same-state repeats are ignored.
	pub fn state_changed(&self, previous: MessengerState, new: MessengerState) {
		if new == previous {
			return;
		}

		let stamped = self.clock.now();
		if stamped.is_none() {
			warn!(device_id = %self.device_id, "failed to timestamp messenger state change (clock read failed)");
		}

		let mut view = lock(&self.views.messenger);
		view.state = new;
		view.last_changed = stamped;
	}
}
