use std::any::Any;

/// Extracts the message from a panic payload.
///
/// Returns `None` when the payload is neither a `&'static str` nor a `String`.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}
