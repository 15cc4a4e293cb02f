//! Wire-Shaped Frame Builders
//!
//! One-line constructors for the push frames a hub would deliver,
//! carrying the exact camelCase payload shapes the engine decodes.

use serde_json::json;

use bazaar_core::channel::event_names;
use bazaar_core::PushFrame;

/// A `messageReceived` frame.
pub fn message(conversation: &str, id: &str, sender: &str, content: &str, timestamp: u64) -> PushFrame {
    PushFrame::new(
        event_names::MESSAGE_RECEIVED,
        json!({
            "conversationId": conversation,
            "messageId": id,
            "senderId": sender,
            "content": content,
            "timestamp": timestamp,
        }),
    )
}

/// A `messageDelivered` receipt frame.
pub fn delivered(id: &str) -> PushFrame {
    PushFrame::new(event_names::MESSAGE_DELIVERED, json!({ "messageId": id }))
}

/// A `messageRead` receipt frame.
pub fn read(id: &str) -> PushFrame {
    PushFrame::new(event_names::MESSAGE_READ, json!({ "messageId": id }))
}

/// A `newNotification` frame.
pub fn notification(id: &str, kind: &str, title: &str, body: &str) -> PushFrame {
    PushFrame::new(
        event_names::NEW_NOTIFICATION,
        json!({
            "notificationId": id,
            "type": kind,
            "title": title,
            "body": body,
        }),
    )
}

/// An `unreadCountUpdate` frame.
pub fn unread_count(count: u32) -> PushFrame {
    PushFrame::new(event_names::UNREAD_COUNT_UPDATE, json!({ "count": count }))
}

/// A `scoreUpdate` frame.
pub fn score(value: f64, timestamp: u64) -> PushFrame {
    PushFrame::new(
        event_names::SCORE_UPDATE,
        json!({
            "metric": "overall",
            "value": value,
            "timestamp": timestamp,
        }),
    )
}

/// A frame with an event name no subscriber registered for.
pub fn unrelated() -> PushFrame {
    PushFrame::new("presenceChanged", json!({ "userId": "u-x", "online": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::push::{MessagePush, ScorePush};

    #[test]
    fn built_frames_decode_into_typed_pushes() {
        let frame = message("c1", "m1", "u1", "hello", 42);
        assert_eq!(frame.event, event_names::MESSAGE_RECEIVED);
        let push: MessagePush = frame.decode().unwrap();
        assert_eq!(push.content, "hello");
        assert_eq!(push.timestamp.as_millis(), 42);

        let push: ScorePush = score(61.5, 7).decode().unwrap();
        assert_eq!(push.value, 61.5);
    }
}
