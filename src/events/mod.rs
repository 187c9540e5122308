//! Event envelope and the catalog of client events.

mod payload;

pub use payload::{
    ConnectionState, DisconnectReason, MessageKey, MessageUpsert, PresenceKind, ReceiptUpdate,
    UpsertKind, UpsertedMessage, WaEvent,
};

use std::time::SystemTime;

/// Event names emitted by a Baileys-style WhatsApp Web client.
pub mod names {
    pub const CONNECTION_UPDATE: &str = "connection.update";
    pub const CREDS_UPDATE: &str = "creds.update";
    pub const MESSAGING_HISTORY_SET: &str = "messaging-history.set";
    pub const CHATS_UPSERT: &str = "chats.upsert";
    pub const CHATS_UPDATE: &str = "chats.update";
    pub const CHATS_DELETE: &str = "chats.delete";
    pub const CONTACTS_UPSERT: &str = "contacts.upsert";
    pub const CONTACTS_UPDATE: &str = "contacts.update";
    pub const MESSAGES_UPSERT: &str = "messages.upsert";
    pub const MESSAGES_UPDATE: &str = "messages.update";
    pub const MESSAGES_DELETE: &str = "messages.delete";
    pub const MESSAGES_REACTION: &str = "messages.reaction";
    pub const MESSAGE_RECEIPT_UPDATE: &str = "message-receipt.update";
    pub const PRESENCE_UPDATE: &str = "presence.update";
    pub const GROUPS_UPSERT: &str = "groups.upsert";
    pub const GROUPS_UPDATE: &str = "groups.update";
    pub const GROUP_PARTICIPANTS_UPDATE: &str = "group-participants.update";
    pub const BLOCKLIST_SET: &str = "blocklist.set";
    pub const BLOCKLIST_UPDATE: &str = "blocklist.update";
    pub const CALL: &str = "call";

    /// Every known event name.
    pub const ALL: &[&str] = &[
        CONNECTION_UPDATE,
        CREDS_UPDATE,
        MESSAGING_HISTORY_SET,
        CHATS_UPSERT,
        CHATS_UPDATE,
        CHATS_DELETE,
        CONTACTS_UPSERT,
        CONTACTS_UPDATE,
        MESSAGES_UPSERT,
        MESSAGES_UPDATE,
        MESSAGES_DELETE,
        MESSAGES_REACTION,
        MESSAGE_RECEIPT_UPDATE,
        PRESENCE_UPDATE,
        GROUPS_UPSERT,
        GROUPS_UPDATE,
        GROUP_PARTICIPANTS_UPDATE,
        BLOCKLIST_SET,
        BLOCKLIST_UPDATE,
        CALL,
    ];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Position of an event in its queue. Starts at 1 and never repeats.
pub type Seq = u64;

/// A named event with its payload, as held by the dispatch queue.
#[derive(Clone, Debug)]
pub struct Event<P> {
    pub name: String,
    pub payload: P,
    pub seq: Seq,
    pub received_at: SystemTime,
}

impl<P> Event<P> {
    pub(crate) fn new(name: String, payload: P, seq: Seq) -> Self {
        Self {
            name,
            payload,
            seq,
            received_at: SystemTime::now(),
        }
    }
}

/// Payloads that know which event they belong to.
pub trait Named {
    fn event_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_no_duplicates() {
        let mut all = names::ALL.to_vec();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), names::ALL.len());
    }

    #[test]
    fn known_names() {
        assert!(names::is_known("messages.upsert"));
        assert!(names::is_known("group-participants.update"));
        assert!(!names::is_known("messages.upserted"));
    }
}
