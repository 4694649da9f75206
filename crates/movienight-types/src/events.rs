use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, MovieEntry};

/// Events sent from the relay to connected sockets.
///
/// Frames are `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Someone entered the room (never sent to the joiner)
    UserJoined { user_id: Option<String> },

    /// Someone left the room, explicitly or by disconnecting
    UserLeft { user_id: Option<String> },

    /// Typing indicator, relayed verbatim to everyone but the typist
    UserTyping {
        user_id: Option<String>,
        username: Option<String>,
        is_typing: bool,
    },

    /// Reply to the joining socket only: recent chat, oldest first
    ChatHistory(Vec<ChatMessage>),

    /// A persisted chat message, delivered to the whole room including the sender
    NewMessage(ChatMessage),

    /// A movie was added through the REST API
    NewMovie(MovieEntry),

    /// A movie was removed through the REST API
    MovieRemoved { tmdb_id: i64 },

    /// The watch party was scheduled, moved, or cleared
    PartyTimeUpdated { party_time: Option<DateTime<Utc>> },
}

/// Commands sent FROM a socket TO the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinRoom {
        watchlist_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },

    LeaveRoom {
        watchlist_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },

    Typing {
        watchlist_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        is_typing: bool,
    },

    ChatMessage {
        watchlist_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_commands_use_camel_case_names() {
        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "chatMessage",
            "data": {
                "watchlistId": "w1",
                "userId": "u1",
                "username": "bob",
                "text": "hi"
            }
        }))
        .unwrap();

        assert_eq!(
            cmd,
            ClientCommand::ChatMessage {
                watchlist_id: "w1".into(),
                user_id: Some("u1".into()),
                username: Some("bob".into()),
                text: "hi".into(),
            }
        );
    }

    #[test]
    fn join_without_user_id_is_accepted() {
        let cmd: ClientCommand =
            serde_json::from_value(json!({ "event": "joinRoom", "data": { "watchlistId": "w1" } }))
                .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinRoom {
                watchlist_id: "w1".into(),
                user_id: None,
            }
        );
    }

    #[test]
    fn server_events_use_camel_case_names() {
        let value = serde_json::to_value(ServerEvent::UserTyping {
            user_id: Some("u1".into()),
            username: Some("bob".into()),
            is_typing: true,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "event": "userTyping",
                "data": { "userId": "u1", "username": "bob", "isTyping": true }
            })
        );

        let value = serde_json::to_value(ServerEvent::PartyTimeUpdated { party_time: None }).unwrap();
        assert_eq!(value, json!({ "event": "partyTimeUpdated", "data": { "partyTime": null } }));

        let value = serde_json::to_value(ServerEvent::MovieRemoved { tmdb_id: 550 }).unwrap();
        assert_eq!(value, json!({ "event": "movieRemoved", "data": { "tmdbId": 550 } }));
    }
}
