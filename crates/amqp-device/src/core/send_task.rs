//! Per-message tracking of device-to-cloud sends.

use tracing::debug;

use crate::messenger::{MessengerSendResult, OnMessengerSendComplete};
use crate::types::{D2cSendResult, Message, OnSendComplete};

/// Tracks one in-flight send until the messenger reports its completion.
///
/// Converted into the messenger-facing completion callback at submission;
/// from then on the messenger owns it. If the submission is rejected the
/// task is dropped without the caller callback ever firing.
pub(crate) struct SendTask {
	on_complete: Option<OnSendComplete>,
}

impl SendTask {
	pub fn new(on_complete: Option<OnSendComplete>) -> Self {
		Self { on_complete }
	}

	pub fn into_messenger_callback(self) -> OnMessengerSendComplete {
		Box::new(move |message: &Message, result: MessengerSendResult| {
			let translated = translate_send_result(result);
			debug!(result = ?translated, "event send completed");

			if let Some(callback) = self.on_complete {
				callback(message, translated);
			}
		})
	}
}

pub(crate) fn translate_send_result(result: MessengerSendResult) -> D2cSendResult {
	match result {
		MessengerSendResult::Ok => D2cSendResult::Ok,
		MessengerSendResult::CannotParse => D2cSendResult::CannotParse,
		MessengerSendResult::FailSending => D2cSendResult::FailSending,
		MessengerSendResult::Timeout => D2cSendResult::Timeout,
		MessengerSendResult::MessengerDestroyed => D2cSendResult::DeviceDestroyed,
	}
}
