//! Push messages and the notifications they turn into.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

const NOTIFICATION_ICON: &str = "/favicon-192x192.png";
const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// Action that opens the site when clicked.
pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

/// JSON body of a push message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
  pub title: String,
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub primary_key: serde_json::Value,
}

impl PushPayload {
  pub fn parse(data: &str) -> Result<Self> {
    serde_json::from_str(data).map_err(|e| eyre!("Invalid push payload: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

impl Notification {
  pub fn from_push(payload: PushPayload, arrived_at: DateTime<Utc>) -> Self {
    let action = |action: &str, title: &str| NotificationAction {
      action: action.to_string(),
      title: title.to_string(),
      icon: NOTIFICATION_ICON.to_string(),
    };

    Self {
      title: payload.title,
      body: payload.body,
      icon: NOTIFICATION_ICON.to_string(),
      badge: NOTIFICATION_ICON.to_string(),
      vibrate: VIBRATE_PATTERN.to_vec(),
      data: NotificationData {
        date_of_arrival: arrived_at.timestamp_millis(),
        primary_key: payload.primary_key,
      },
      actions: vec![
        action(EXPLORE_ACTION, "View Portfolio"),
        action(CLOSE_ACTION, "Close"),
      ],
    }
  }
}
