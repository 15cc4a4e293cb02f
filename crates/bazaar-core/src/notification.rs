//! Notification Records

use serde::{Deserialize, Serialize};

use crate::push::NotificationPush;
use crate::types::{NotificationId, Timestamp};

/// A notification as held by the store.
///
/// Arrives either through a push event (always unread, prepended) or a
/// full-list fetch (authoritative ordering and read flags).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    /// Materialize a pushed notification. Push payloads carry no created
    /// timestamp, so the receive time stands in for it.
    pub fn from_push(push: NotificationPush, received_at: Timestamp) -> Self {
        Self {
            id: push.notification_id,
            kind: push.kind,
            title: push.title,
            body: push.body,
            action_url: push.action_url,
            is_read: false,
            created_at: received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_notification_is_unread_and_stamped() {
        let push = NotificationPush {
            notification_id: NotificationId::new("n1"),
            kind: "offer".to_string(),
            title: "New offer".to_string(),
            body: "Someone made an offer on your listing".to_string(),
            action_url: Some("/offers/1".to_string()),
            listing_id: None,
        };
        let n = Notification::from_push(push, Timestamp::from_millis(777));
        assert!(!n.is_read);
        assert_eq!(n.created_at, Timestamp::from_millis(777));
        assert_eq!(n.kind, "offer");
        assert_eq!(n.action_url.as_deref(), Some("/offers/1"));
    }

    #[test]
    fn wire_shape_uses_type_for_kind() {
        let n = Notification {
            id: NotificationId::new("n2"),
            kind: "system".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            action_url: None,
            is_read: true,
            created_at: Timestamp::from_millis(1),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["isRead"], true);
    }
}
