//! Telegram Bot API request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// RESPONSE ENVELOPE
// =============================================================================

/// Every Bot API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<u16>,
    pub description: Option<String>,
    pub parameters: Option<ResponseParameters>,
}

/// Extra information attached to failed calls.
#[derive(Debug, Default, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before repeating a rate-limited request.
    pub retry_after: Option<u64>,
    pub migrate_to_chat_id: Option<i64>,
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// The subset of a Bot API `Message` the adapter reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EditMessageTextRequest<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageRequest {
    pub chat_id: i64,
    pub message_id: i64,
}

// =============================================================================
// REACTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionType {
    Emoji { emoji: String },
}

/// An empty `reaction` list clears the bot's reactions.
#[derive(Debug, Serialize)]
pub struct SetMessageReactionRequest {
    pub chat_id: i64,
    pub message_id: i64,
    pub reaction: Vec<ReactionType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_deserializes_retry_after() {
        let raw = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#;
        let resp: ApiResponse<Message> = serde_json::from_str(raw).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(429));
        assert_eq!(resp.parameters.unwrap().retry_after, Some(5));
    }

    #[test]
    fn test_reaction_serializes_with_type_tag() {
        let req = SetMessageReactionRequest {
            chat_id: -100,
            message_id: 7,
            reaction: vec![ReactionType::Emoji {
                emoji: "👍".to_string(),
            }],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["reaction"][0]["type"], "emoji");
        assert_eq!(value["reaction"][0]["emoji"], "👍");
    }
}
