//! Conversation: a messaging session tied to an applicant.
//!
//! The qualification state machine lives in the external automation platform;
//! this crate only knows the states and the reset performed on registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

/// Domain suffix of WhatsApp user identifiers.
pub const WHATSAPP_JID_SUFFIX: &str = "@s.whatsapp.net";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
  #[default]
  Web,
  Whatsapp,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationState {
  #[default]
  AwaitingOptIn,
  OptedIn,
  Qualifying,
  Qualified,
  Rejected,
  Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
  /// Doubles as the session id handed to the web client.
  pub conversation_id: Uuid,
  pub applicant_id:    Uuid,
  pub remote_jid:      String,
  pub channel:         Channel,
  pub state:           ConversationState,
  pub last_message_id: Option<String>,
  pub updated_at:      DateTime<Utc>,
}

impl Conversation {
  /// A conversation in the registration state: web channel, awaiting opt-in.
  pub fn registered(applicant_id: Uuid, remote_jid: String) -> Self {
    Self {
      conversation_id: Uuid::new_v4(),
      applicant_id,
      remote_jid,
      channel: Channel::Web,
      state: ConversationState::AwaitingOptIn,
      last_message_id: None,
      updated_at: Utc::now(),
    }
  }

  /// Re-point at `applicant_id` and reset channel and state. Applied on every
  /// registration, whatever the previous state was.
  pub fn reset_for(&mut self, applicant_id: Uuid) {
    self.applicant_id = applicant_id;
    self.channel = Channel::Web;
    self.state = ConversationState::AwaitingOptIn;
    self.updated_at = Utc::now();
  }
}

/// Derive the messaging identifier for a phone number: its digits followed by
/// the WhatsApp domain suffix.
pub fn remote_jid_for_phone(phone: &str) -> String {
  let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
  format!("{digits}{WHATSAPP_JID_SUFFIX}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn jid_from_formatted_phone() {
    assert_eq!(
      remote_jid_for_phone("+57 300 123 4567"),
      "573001234567@s.whatsapp.net"
    );
  }

  #[test]
  fn reset_restores_registration_state() {
    let mut conv = Conversation::registered(Uuid::new_v4(), "1@s.whatsapp.net".into());
    conv.channel = Channel::Whatsapp;
    conv.state = ConversationState::Qualified;

    let other = Uuid::new_v4();
    conv.reset_for(other);
    assert_eq!(conv.applicant_id, other);
    assert_eq!(conv.channel, Channel::Web);
    assert_eq!(conv.state, ConversationState::AwaitingOptIn);
  }

  #[test]
  fn states_round_trip_through_strings() {
    assert_eq!(ConversationState::AwaitingOptIn.as_ref(), "awaiting_opt_in");
    assert_eq!(
      "opted_in".parse::<ConversationState>().unwrap(),
      ConversationState::OptedIn
    );
  }
}
