//! Dispatch of cloud-to-device deliveries to the caller.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::core::{disposition, lock};
use crate::messenger::{MessageDispositionInfo, MessengerDispositionResult};
use crate::types::{Message, OnMessageReceived};

/// Registered caller callback, shared between the device and the adapter
/// closure held by the messenger.
pub(crate) type MessageHandlerSlot = Arc<Mutex<Option<OnMessageReceived>>>;

/// Routes one delivered message to the registered caller callback and
/// translates its verdict back into the messenger vocabulary. Deliveries
/// without a registered callback are released back to the broker.
pub(crate) fn dispatch(slot: &MessageHandlerSlot, device_id: &str, message: &Message, info: &MessageDispositionInfo) -> MessengerDispositionResult {
	let mut guard = lock(slot);
	match guard.as_mut() {
		None => {
			warn!(device_id, message_id = info.message_id, "releasing incoming message (no callback registered)");
			MessengerDispositionResult::Released
		}
		Some(on_message) => {
			let device_info = disposition::to_device_info(info);
			let verdict = on_message(message, &device_info);
			disposition::to_messenger_result(verdict)
		}
	}
}
