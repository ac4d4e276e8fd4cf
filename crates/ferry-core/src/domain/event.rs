//! Event - EventTarget で配送されるイベント

use super::value::Value;

/// `message`: a worker→owner payload was delivered.
pub const MESSAGE: &str = "message";

/// `error`: the worker failed to start or raised an uncaught error.
pub const ERROR: &str = "error";

/// `messageerror`: a received envelope could not be deserialized.
pub const MESSAGE_ERROR: &str = "messageerror";

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: String,
    detail: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, detail: Value) -> Self {
        Self {
            event_type: event_type.into(),
            detail,
        }
    }

    pub fn message(data: Value) -> Self {
        Self::new(MESSAGE, data)
    }

    /// `error` event; detail is `{ "kind": .., "message": .. }`.
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        let detail = Value::object([
            ("kind", Value::from(kind)),
            ("message", Value::String(message.into())),
        ]);
        Self::new(ERROR, detail)
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Alias of [`Event::detail`] matching `MessageEvent.data`.
    pub fn data(&self) -> &Value {
        &self.detail
    }

    /// Failure description carried by `error` events.
    pub fn error_message(&self) -> Option<String> {
        if self.event_type != ERROR {
            return None;
        }
        self.detail
            .get("message")
            .and_then(|m| m.as_str().map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_events_carry_kind_and_message() {
        let ev = Event::error("uncaught", "boom");
        assert_eq!(ev.event_type(), ERROR);
        assert_eq!(ev.error_message().as_deref(), Some("boom"));
        assert_eq!(ev.detail().get("kind"), Some(Value::from("uncaught")));
    }

    #[test]
    fn message_events_have_no_error_message() {
        let ev = Event::message(Value::from("boom"));
        assert_eq!(ev.data(), &Value::from("boom"));
        assert_eq!(ev.error_message(), None);
    }
}
