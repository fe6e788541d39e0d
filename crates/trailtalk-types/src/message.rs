//! Chat-channel message kinds and their line-oriented wire form.
//!
//! Every frame on the wire is one UTF-8 line. A line whose first
//! `:`-separated field is [`FRIEND_REQUEST_TAG`] carries a friend request;
//! any other line is chat text, verbatim.

use uuid::Uuid;

/// Rendezvous service identifier shared by every trailtalk installation.
///
/// Used both when advertising the local endpoint and when deciding which
/// browsed services belong to this application.
pub const SERVICE_ID: Uuid = uuid::uuid!("8ce255c0-200a-11e0-ac64-0800200c9a66");

/// Tag prefixing a friend-request line on the wire.
pub const FRIEND_REQUEST_TAG: &str = "FRIEND_REQUEST";

/// A message exchanged over a live peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// Free-form chat text.
    Text(String),

    /// Friend request carrying the sender's account ID and display name.
    FriendRequest { user_id: String, user_name: String },
}

impl ChatMessage {
    /// Serialize to a single wire line (without the terminating newline).
    ///
    /// Chat text is flattened to one line: an embedded newline would split
    /// the frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.replace(['\r', '\n'], " "),
            Self::FriendRequest { user_id, user_name } => {
                format!("{FRIEND_REQUEST_TAG}:{user_id}:{user_name}")
            }
        }
    }

    /// Decode one wire line.
    ///
    /// Returns `None` for a friend-request line with fewer than three
    /// fields — such frames are dropped, not surfaced as errors. Fields
    /// beyond the third are ignored. Every other line decodes as chat
    /// text, verbatim.
    #[must_use]
    pub fn decode(line: &str) -> Option<Self> {
        let mut fields = line.split(':');
        if fields.next() == Some(FRIEND_REQUEST_TAG) {
            match (fields.next(), fields.next()) {
                (Some(user_id), Some(user_name)) => Some(Self::FriendRequest {
                    user_id: user_id.to_string(),
                    user_name: user_name.to_string(),
                }),
                _ => None,
            }
        } else {
            Some(Self::Text(line.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_request_roundtrip() {
        let msg = ChatMessage::FriendRequest {
            user_id: "u1".to_string(),
            user_name: "Ann".to_string(),
        };
        let line = msg.encode();
        assert_eq!(line, "FRIEND_REQUEST:u1:Ann");
        assert_eq!(ChatMessage::decode(&line), Some(msg));
    }

    #[test]
    fn chat_text_verbatim() {
        let decoded = ChatMessage::decode("see you at the summit");
        assert_eq!(
            decoded,
            Some(ChatMessage::Text("see you at the summit".to_string()))
        );
    }

    #[test]
    fn chat_text_with_colons_is_not_a_friend_request() {
        let decoded = ChatMessage::decode("meet at 10:30:00");
        assert_eq!(decoded, Some(ChatMessage::Text("meet at 10:30:00".to_string())));
    }

    #[test]
    fn short_friend_request_is_dropped() {
        assert_eq!(ChatMessage::decode("FRIEND_REQUEST:u1"), None);
        assert_eq!(ChatMessage::decode("FRIEND_REQUEST"), None);
    }

    #[test]
    fn extra_friend_request_fields_are_ignored() {
        let decoded = ChatMessage::decode("FRIEND_REQUEST:u1:Ann:extra:junk");
        assert_eq!(
            decoded,
            Some(ChatMessage::FriendRequest {
                user_id: "u1".to_string(),
                user_name: "Ann".to_string(),
            })
        );
    }

    #[test]
    fn empty_line_is_chat_text() {
        assert_eq!(ChatMessage::decode(""), Some(ChatMessage::Text(String::new())));
    }

    #[test]
    fn encode_flattens_newlines() {
        let msg = ChatMessage::Text("two\nlines".to_string());
        assert_eq!(msg.encode(), "two lines");
    }
}
