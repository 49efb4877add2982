#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use amqp_device::auth::{AuthBinding, AuthError, AuthErrorCode, AuthState, Authenticator};
use amqp_device::clock::Clock;
use amqp_device::config::{AuthMode, DeviceConfig, DeviceCredentials};
use amqp_device::core::device::Device;
use amqp_device::core::router::{AuthEventHandler, MessengerEventHandler};
use amqp_device::messenger::{
	MessageDispositionInfo, Messenger, MessengerBinding, MessengerDispositionResult, MessengerError, MessengerSendResult, MessengerState, OnMessengerMessageReceived,
	OnMessengerSendComplete,
};
use amqp_device::options::{OptionBag, OptionValue, OPTION_CBS_REQUEST_TIMEOUT_SECS, OPTION_EVENT_SEND_TIMEOUT_SECS, OPTION_SAS_TOKEN_LIFETIME_SECS, OPTION_SAS_TOKEN_REFRESH_TIME_SECS};
use amqp_device::types::{CbsHandle, DeviceState, Message, OnStateChanged, SendStatus, SessionHandle};
use chrono::{DateTime, Duration, Utc};

pub type TestDevice = Device<MockAuthenticator, MockMessenger>;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Manually advanced wall clock; `fail` simulates a clock read fault.
#[derive(Clone)]
pub struct MockClock {
	now: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl MockClock {
	pub fn starting_now() -> Self {
		Self {
			now: Arc::new(Mutex::new(Some(Utc::now()))),
		}
	}

	pub fn advance_secs(&self, secs: i64) {
		let mut guard = self.now.lock().unwrap();
		*guard = guard.map(|now| now + Duration::seconds(secs));
	}

	pub fn fail(&self) {
		*self.now.lock().unwrap() = None;
	}
}

impl Clock for MockClock {
	fn now(&self) -> Option<DateTime<Utc>> {
		*self.now.lock().unwrap()
	}
}

// ---------------------------------------------------------------------------
// State-change recording
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StateLog {
	transitions: Arc<Mutex<Vec<(DeviceState, DeviceState)>>>,
}

impl StateLog {
	pub fn new() -> Self {
		Self {
			transitions: Arc::new(Mutex::new(Vec::new())),
		}
	}

	pub fn callback(&self) -> OnStateChanged {
		let transitions = Arc::clone(&self.transitions);
		Box::new(move |previous, new| {
			transitions.lock().unwrap().push((previous, new));
		})
	}

	pub fn transitions(&self) -> Vec<(DeviceState, DeviceState)> {
		self.transitions.lock().unwrap().clone()
	}
}

// ---------------------------------------------------------------------------
// Mock authenticator
// ---------------------------------------------------------------------------

pub struct AuthCore {
	events: Option<AuthEventHandler>,
	state: AuthState,
	bound_device_id: Option<String>,
	started_with: Option<CbsHandle>,
	start_calls: usize,
	stop_calls: usize,
	do_work_calls: usize,
	fail_bind: bool,
	fail_start: bool,
	fail_stop: bool,
	received_options: Vec<(String, OptionValue)>,
	options_snapshot: OptionBag,
}

impl AuthCore {
	fn new() -> Self {
		Self {
			events: None,
			state: AuthState::Stopped,
			bound_device_id: None,
			started_with: None,
			start_calls: 0,
			stop_calls: 0,
			do_work_calls: 0,
			fail_bind: false,
			fail_start: false,
			fail_stop: false,
			received_options: Vec::new(),
			options_snapshot: OptionBag::new(),
		}
	}
}

pub struct MockAuthenticator {
	core: Arc<Mutex<AuthCore>>,
}

impl MockAuthenticator {
	pub fn new() -> (Self, AuthProbe) {
		let core = Arc::new(Mutex::new(AuthCore::new()));
		(Self { core: Arc::clone(&core) }, AuthProbe { core })
	}
}

/// Test-side handle onto the mock authenticator's shared state.
#[derive(Clone)]
pub struct AuthProbe {
	core: Arc<Mutex<AuthCore>>,
}

impl AuthProbe {
	/// Drives the worker to a new state, reporting it through the handler
	/// the device bound.
	pub fn transition(&self, new: AuthState) {
		let (previous, events) = {
			let mut core = self.core.lock().unwrap();
			let previous = core.state;
			core.state = new;
			(previous, core.events.clone())
		};
		if let Some(events) = events {
			events.state_changed(previous, new);
		}
	}

	pub fn report_error(&self, code: AuthErrorCode) {
		let events = self.core.lock().unwrap().events.clone();
		if let Some(events) = events {
			events.error_reported(code);
		}
	}

	pub fn fail_bind(&self) {
		self.core.lock().unwrap().fail_bind = true;
	}

	pub fn fail_start(&self) {
		self.core.lock().unwrap().fail_start = true;
	}

	pub fn fail_stop(&self) {
		self.core.lock().unwrap().fail_stop = true;
	}

	pub fn start_calls(&self) -> usize {
		self.core.lock().unwrap().start_calls
	}

	pub fn stop_calls(&self) -> usize {
		self.core.lock().unwrap().stop_calls
	}

	pub fn do_work_calls(&self) -> usize {
		self.core.lock().unwrap().do_work_calls
	}

	pub fn started_with(&self) -> Option<CbsHandle> {
		self.core.lock().unwrap().started_with.clone()
	}

	pub fn bound_device_id(&self) -> Option<String> {
		self.core.lock().unwrap().bound_device_id.clone()
	}

	pub fn set_options_snapshot(&self, bag: OptionBag) {
		self.core.lock().unwrap().options_snapshot = bag;
	}

	pub fn received_options(&self) -> Vec<(String, OptionValue)> {
		self.core.lock().unwrap().received_options.clone()
	}
}

impl Authenticator for MockAuthenticator {
	fn bind(&mut self, binding: AuthBinding) -> Result<(), AuthError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_bind {
			return Err(AuthError::Bind {
				reason: "mock bind failure".to_string(),
			});
		}
		core.bound_device_id = Some(binding.device_id.to_string());
		core.events = Some(binding.events);
		Ok(())
	}

	fn start(&mut self, cbs: CbsHandle) -> Result<(), AuthError> {
		let mut core = self.core.lock().unwrap();
		core.start_calls += 1;
		if core.fail_start {
			return Err(AuthError::Start {
				reason: "mock start failure".to_string(),
			});
		}
		core.started_with = Some(cbs);
		Ok(())
	}

	fn stop(&mut self) -> Result<(), AuthError> {
		let mut core = self.core.lock().unwrap();
		core.stop_calls += 1;
		if core.fail_stop {
			return Err(AuthError::Stop {
				reason: "mock stop failure".to_string(),
			});
		}
		Ok(())
	}

	fn do_work(&mut self) {
		self.core.lock().unwrap().do_work_calls += 1;
	}

	fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), AuthError> {
		let mut core = self.core.lock().unwrap();
		match name {
			OPTION_CBS_REQUEST_TIMEOUT_SECS | OPTION_SAS_TOKEN_REFRESH_TIME_SECS | OPTION_SAS_TOKEN_LIFETIME_SECS => {
				core.received_options.push((name.to_string(), value));
				Ok(())
			}
			_ => Err(AuthError::UnsupportedOption { name: name.to_string() }),
		}
	}

	fn retrieve_options(&self) -> Result<OptionBag, AuthError> {
		Ok(self.core.lock().unwrap().options_snapshot.clone())
	}
}

// ---------------------------------------------------------------------------
// Mock messenger
// ---------------------------------------------------------------------------

pub struct MessengerCore {
	events: Option<MessengerEventHandler>,
	state: MessengerState,
	started_with: Option<SessionHandle>,
	start_calls: usize,
	stop_calls: usize,
	do_work_calls: usize,
	fail_bind: bool,
	fail_start: bool,
	fail_stop: bool,
	fail_send: bool,
	fail_subscribe: bool,
	fail_unsubscribe: bool,
	fail_disposition: bool,
	send_status: SendStatus,
	pending_sends: Vec<(Message, OnMessengerSendComplete)>,
	on_message: Option<OnMessengerMessageReceived>,
	dispositions: Vec<(MessageDispositionInfo, MessengerDispositionResult)>,
	received_options: Vec<(String, OptionValue)>,
	options_snapshot: OptionBag,
}

impl MessengerCore {
	fn new() -> Self {
		Self {
			events: None,
			state: MessengerState::Stopped,
			started_with: None,
			start_calls: 0,
			stop_calls: 0,
			do_work_calls: 0,
			fail_bind: false,
			fail_start: false,
			fail_stop: false,
			fail_send: false,
			fail_subscribe: false,
			fail_unsubscribe: false,
			fail_disposition: false,
			send_status: SendStatus::Idle,
			pending_sends: Vec::new(),
			on_message: None,
			dispositions: Vec::new(),
			received_options: Vec::new(),
			options_snapshot: OptionBag::new(),
		}
	}
}

pub struct MockMessenger {
	core: Arc<Mutex<MessengerCore>>,
}

impl MockMessenger {
	pub fn new() -> (Self, MessengerProbe) {
		let core = Arc::new(Mutex::new(MessengerCore::new()));
		(Self { core: Arc::clone(&core) }, MessengerProbe { core })
	}
}

impl Drop for MockMessenger {
	// Pending sends complete with MessengerDestroyed, per the contract.
	fn drop(&mut self) {
		let pending: Vec<(Message, OnMessengerSendComplete)> = self.core.lock().unwrap().pending_sends.drain(..).collect();
		for (message, on_complete) in pending {
			on_complete(&message, MessengerSendResult::MessengerDestroyed);
		}
	}
}

/// Test-side handle onto the mock messenger's shared state.
#[derive(Clone)]
pub struct MessengerProbe {
	core: Arc<Mutex<MessengerCore>>,
}

impl MessengerProbe {
	pub fn transition(&self, new: MessengerState) {
		let (previous, events) = {
			let mut core = self.core.lock().unwrap();
			let previous = core.state;
			core.state = new;
			(previous, core.events.clone())
		};
		if let Some(events) = events {
			events.state_changed(previous, new);
		}
	}

	pub fn fail_bind(&self) {
		self.core.lock().unwrap().fail_bind = true;
	}

	pub fn fail_start(&self) {
		self.core.lock().unwrap().fail_start = true;
	}

	pub fn fail_stop(&self) {
		self.core.lock().unwrap().fail_stop = true;
	}

	pub fn fail_send(&self) {
		self.core.lock().unwrap().fail_send = true;
	}

	pub fn fail_subscribe(&self) {
		self.core.lock().unwrap().fail_subscribe = true;
	}

	pub fn fail_unsubscribe(&self) {
		self.core.lock().unwrap().fail_unsubscribe = true;
	}

	pub fn fail_disposition(&self) {
		self.core.lock().unwrap().fail_disposition = true;
	}

	pub fn set_send_status(&self, status: SendStatus) {
		self.core.lock().unwrap().send_status = status;
	}

	pub fn start_calls(&self) -> usize {
		self.core.lock().unwrap().start_calls
	}

	pub fn stop_calls(&self) -> usize {
		self.core.lock().unwrap().stop_calls
	}

	pub fn do_work_calls(&self) -> usize {
		self.core.lock().unwrap().do_work_calls
	}

	pub fn started_with(&self) -> Option<SessionHandle> {
		self.core.lock().unwrap().started_with.clone()
	}

	pub fn pending_send_count(&self) -> usize {
		self.core.lock().unwrap().pending_sends.len()
	}

	/// Completes the oldest pending send with the given result.
	pub fn complete_next_send(&self, result: MessengerSendResult) {
		let entry = {
			let mut core = self.core.lock().unwrap();
			if core.pending_sends.is_empty() {
				None
			} else {
				Some(core.pending_sends.remove(0))
			}
		};
		if let Some((message, on_complete)) = entry {
			on_complete(&message, result);
		}
	}

	/// Delivers an incoming message through the subscribed adapter, returning
	/// the settlement verdict, or `None` when nothing is subscribed.
	pub fn deliver(&self, message: &Message, info: &MessageDispositionInfo) -> Option<MessengerDispositionResult> {
		let mut core = self.core.lock().unwrap();
		let on_message = core.on_message.as_mut()?;
		Some(on_message(message, info))
	}

	pub fn has_subscriber(&self) -> bool {
		self.core.lock().unwrap().on_message.is_some()
	}

	pub fn dispositions(&self) -> Vec<(MessageDispositionInfo, MessengerDispositionResult)> {
		self.core.lock().unwrap().dispositions.clone()
	}

	pub fn set_options_snapshot(&self, bag: OptionBag) {
		self.core.lock().unwrap().options_snapshot = bag;
	}

	pub fn received_options(&self) -> Vec<(String, OptionValue)> {
		self.core.lock().unwrap().received_options.clone()
	}
}

impl Messenger for MockMessenger {
	fn bind(&mut self, binding: MessengerBinding) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_bind {
			return Err(MessengerError::Bind {
				reason: "mock bind failure".to_string(),
			});
		}
		core.events = Some(binding.events);
		Ok(())
	}

	fn start(&mut self, session: SessionHandle) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		core.start_calls += 1;
		if core.fail_start {
			return Err(MessengerError::Start {
				reason: "mock start failure".to_string(),
			});
		}
		core.started_with = Some(session);
		Ok(())
	}

	fn stop(&mut self) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		core.stop_calls += 1;
		if core.fail_stop {
			return Err(MessengerError::Stop {
				reason: "mock stop failure".to_string(),
			});
		}
		Ok(())
	}

	fn do_work(&mut self) {
		self.core.lock().unwrap().do_work_calls += 1;
	}

	fn send_async(&mut self, message: Message, on_complete: OnMessengerSendComplete) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_send {
			return Err(MessengerError::Send {
				reason: "mock send failure".to_string(),
			});
		}
		core.pending_sends.push((message, on_complete));
		Ok(())
	}

	fn get_send_status(&self) -> Result<SendStatus, MessengerError> {
		Ok(self.core.lock().unwrap().send_status)
	}

	fn subscribe(&mut self, on_message: OnMessengerMessageReceived) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_subscribe {
			return Err(MessengerError::Subscribe {
				reason: "mock subscribe failure".to_string(),
			});
		}
		core.on_message = Some(on_message);
		Ok(())
	}

	fn unsubscribe(&mut self) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_unsubscribe {
			return Err(MessengerError::Unsubscribe {
				reason: "mock unsubscribe failure".to_string(),
			});
		}
		core.on_message = None;
		Ok(())
	}

	fn send_message_disposition(&mut self, info: &MessageDispositionInfo, result: MessengerDispositionResult) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		if core.fail_disposition {
			return Err(MessengerError::Disposition {
				reason: "mock disposition failure".to_string(),
			});
		}
		core.dispositions.push((info.clone(), result));
		Ok(())
	}

	fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), MessengerError> {
		let mut core = self.core.lock().unwrap();
		match name {
			OPTION_EVENT_SEND_TIMEOUT_SECS => {
				core.received_options.push((name.to_string(), value));
				Ok(())
			}
			_ => Err(MessengerError::UnsupportedOption { name: name.to_string() }),
		}
	}

	fn retrieve_options(&self) -> Result<OptionBag, MessengerError> {
		Ok(self.core.lock().unwrap().options_snapshot.clone())
	}
}

// ---------------------------------------------------------------------------
// Device construction helpers
// ---------------------------------------------------------------------------

pub fn cbs_config(log: &StateLog) -> DeviceConfig {
	DeviceConfig::new(
		"test-device",
		"hub.example.azure-devices.net",
		AuthMode::Cbs(DeviceCredentials::SasToken("SharedAccessSignature sr=test".to_string())),
		log.callback(),
	)
}

pub fn x509_config(log: &StateLog) -> DeviceConfig {
	DeviceConfig::new("test-device", "hub.example.azure-devices.net", AuthMode::X509, log.callback())
}

pub fn session() -> SessionHandle {
	SessionHandle::new("session-1")
}

pub fn cbs_handle() -> CbsHandle {
	CbsHandle::new("cbs-1")
}

/// Creates a CBS-mode device wired to fresh mocks.
pub fn create_cbs_device() -> (TestDevice, AuthProbe, MessengerProbe, MockClock, StateLog) {
	let log = StateLog::new();
	let (authenticator, auth_probe) = MockAuthenticator::new();
	let (messenger, msgr_probe) = MockMessenger::new();
	let clock = MockClock::starting_now();

	let device = Device::create(cbs_config(&log), Some(authenticator), messenger, Arc::new(clock.clone())).expect("creating CBS device");

	(device, auth_probe, msgr_probe, clock, log)
}

/// Creates an X509-mode device (no authenticator) wired to fresh mocks.
pub fn create_x509_device() -> (TestDevice, MessengerProbe, MockClock, StateLog) {
	let log = StateLog::new();
	let (messenger, msgr_probe) = MockMessenger::new();
	let clock = MockClock::starting_now();

	let device: TestDevice = Device::create(x509_config(&log), None, messenger, Arc::new(clock.clone())).expect("creating X509 device");

	(device, msgr_probe, clock, log)
}

/// Drives a CBS device from stopped to started, mirroring a healthy startup.
pub fn start_cbs_device(device: &mut TestDevice, auth: &AuthProbe, msgr: &MessengerProbe) {
	device.start_async(session(), Some(cbs_handle())).expect("start_async");
	device.do_work();
	auth.transition(AuthState::Starting);
	device.do_work();
	auth.transition(AuthState::Started);
	device.do_work();
	msgr.transition(MessengerState::Starting);
	device.do_work();
	msgr.transition(MessengerState::Started);
	device.do_work();
	assert_eq!(device.state(), DeviceState::Started);
}
