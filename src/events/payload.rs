//! Typed payloads for the most common client events.

use super::{names, Named};
use std::time::SystemTime;

/// Events a WhatsApp Web client hands to the dispatch queue.
#[derive(Clone, Debug, PartialEq)]
pub enum WaEvent {
    /// Connection state change. `qr` is set while waiting for the phone to scan.
    ConnectionUpdate {
        connection: Option<ConnectionState>,
        qr: Option<String>,
        last_disconnect: Option<DisconnectReason>,
        is_new_login: bool,
    },

    /// Credentials changed and should be saved.
    CredsUpdate,

    /// New or appended messages.
    MessagesUpsert(MessageUpsert),

    /// Messages deleted for everyone.
    MessagesDelete { keys: Vec<MessageKey> },

    /// Delivery/read receipts.
    MessageReceiptUpdate(Vec<ReceiptUpdate>),

    /// Presence of a contact in a chat.
    PresenceUpdate {
        chat: String,
        participant: String,
        presence: PresenceKind,
    },

    /// Participants added/removed/promoted/demoted in a group.
    GroupParticipantsUpdate {
        group: String,
        participants: Vec<String>,
        action: String,
    },

    /// History sync chunk.
    MessagingHistorySet { chats: u32, messages: u32, is_latest: bool },

    /// Incoming call offer.
    Call { from: String, id: String },
}

impl Named for WaEvent {
    fn event_name(&self) -> &str {
        match self {
            Self::ConnectionUpdate { .. } => names::CONNECTION_UPDATE,
            Self::CredsUpdate => names::CREDS_UPDATE,
            Self::MessagesUpsert(_) => names::MESSAGES_UPSERT,
            Self::MessagesDelete { .. } => names::MESSAGES_DELETE,
            Self::MessageReceiptUpdate(_) => names::MESSAGE_RECEIPT_UPDATE,
            Self::PresenceUpdate { .. } => names::PRESENCE_UPDATE,
            Self::GroupParticipantsUpdate { .. } => names::GROUP_PARTICIPANTS_UPDATE,
            Self::MessagingHistorySet { .. } => names::MESSAGING_HISTORY_SET,
            Self::Call { .. } => names::CALL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// Identifies a message within a chat.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub remote_jid: String,
    pub id: String,
    pub from_me: bool,
    pub participant: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertKind {
    /// Live message; reply-worthy.
    Notify,
    /// Backfilled from another device or history.
    Append,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageUpsert {
    pub kind: UpsertKind,
    pub messages: Vec<UpsertedMessage>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpsertedMessage {
    pub key: MessageKey,
    pub push_name: Option<String>,
    pub timestamp: SystemTime,
    /// Plain text body when the message has one.
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReceiptUpdate {
    pub key: MessageKey,
    pub user: String,
    pub read: bool,
    pub timestamp: SystemTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceKind {
    Unavailable,
    Available,
    Composing,
    Recording,
    Paused,
}

/// Status codes carried by a closed connection.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DisconnectReason {
    LoggedOut = 401,
    Forbidden = 403,
    ConnectionLost = 408,
    MultideviceMismatch = 411,
    ConnectionClosed = 428,
    ConnectionReplaced = 440,
    BadSession = 500,
    UnavailableService = 503,
    RestartRequired = 515,
}

impl DisconnectReason {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            401 => Some(Self::LoggedOut),
            403 => Some(Self::Forbidden),
            408 => Some(Self::ConnectionLost),
            411 => Some(Self::MultideviceMismatch),
            428 => Some(Self::ConnectionClosed),
            440 => Some(Self::ConnectionReplaced),
            500 => Some(Self::BadSession),
            503 => Some(Self::UnavailableService),
            515 => Some(Self::RestartRequired),
            _ => None,
        }
    }

    /// Whether the application should reconnect rather than re-pair.
    pub fn should_reconnect(&self) -> bool {
        !matches!(self, Self::LoggedOut | Self::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_name_their_event() {
        let evt = WaEvent::ConnectionUpdate {
            connection: Some(ConnectionState::Open),
            qr: None,
            last_disconnect: None,
            is_new_login: false,
        };
        assert_eq!(evt.event_name(), "connection.update");
        assert_eq!(WaEvent::CredsUpdate.event_name(), "creds.update");
        let upsert = WaEvent::MessagesUpsert(MessageUpsert {
            kind: UpsertKind::Notify,
            messages: vec![],
        });
        assert_eq!(upsert.event_name(), "messages.upsert");
    }

    #[test]
    fn disconnect_reason_codes() {
        assert_eq!(
            DisconnectReason::from_code(515),
            Some(DisconnectReason::RestartRequired)
        );
        assert_eq!(DisconnectReason::from_code(999), None);
        assert!(!DisconnectReason::LoggedOut.should_reconnect());
        assert!(DisconnectReason::ConnectionLost.should_reconnect());
    }
}
