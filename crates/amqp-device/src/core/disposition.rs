//! Translation between the caller- and messenger-facing disposition
//! vocabularies. Descriptors are deep-copied in both directions; neither
//! side ever holds references into the other's storage.

use crate::messenger::{MessageDispositionInfo, MessengerDispositionResult};
use crate::types::{DispositionInfo, DispositionResult};

pub(crate) fn to_messenger_result(result: DispositionResult) -> MessengerDispositionResult {
	match result {
		DispositionResult::None => MessengerDispositionResult::None,
		DispositionResult::Accepted => MessengerDispositionResult::Accepted,
		DispositionResult::Rejected => MessengerDispositionResult::Rejected,
		DispositionResult::Released => MessengerDispositionResult::Released,
	}
}

pub(crate) fn to_device_info(info: &MessageDispositionInfo) -> DispositionInfo {
	DispositionInfo {
		source: info.source.clone(),
		message_id: info.message_id,
	}
}

pub(crate) fn to_messenger_info(info: &DispositionInfo) -> MessageDispositionInfo {
	MessageDispositionInfo {
		source: info.source.clone(),
		message_id: info.message_id,
	}
}
