use chrono::{DateTime, Utc};
use parley_core::models::{MessageKind, MessageRecord, MessageStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::UserId;

/// Everything a client may send over the socket. Deserialization doubles as
/// dispatch: an unknown event name is a deserialization error, and every known
/// name is handled by an exhaustive match in the session loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "conv:join", rename_all = "camelCase")]
    ConversationJoin { conversation_id: i64 },

    #[serde(rename = "conv:leave", rename_all = "camelCase")]
    ConversationLeave { conversation_id: i64 },

    #[serde(rename = "msg:send", rename_all = "camelCase")]
    MessageSend {
        conversation_id: i64,
        temp_id: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        #[serde(default)]
        file_url: Option<String>,
    },

    #[serde(rename = "msg:delivered", rename_all = "camelCase")]
    MessageDelivered {
        message_id: i64,
        conversation_id: i64,
    },

    #[serde(rename = "msg:seen", rename_all = "camelCase")]
    MessageSeen {
        conversation_id: i64,
        last_seen_message_id: i64,
    },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { conversation_id: i64 },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { conversation_id: i64 },

    #[serde(rename = "call_user", rename_all = "camelCase")]
    CallUser {
        user_to_call_id: UserId,
        signal_data: Value,
        from_user: Value,
        #[serde(default)]
        call_type: Option<String>,
    },

    #[serde(rename = "answer_call")]
    AnswerCall { to: UserId, signal: Value },

    #[serde(rename = "ice_candidate")]
    IceCandidate { target: UserId, candidate: Value },

    #[serde(rename = "end_call")]
    EndCall { to: UserId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Everything the server may emit. Cloned per recipient on fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "user_status")]
    UserStatus {
        #[serde(rename = "userId")]
        user_id: UserId,
        status: PresenceStatus,
        last_seen: Option<DateTime<Utc>>,
    },

    #[serde(rename = "online_users")]
    OnlineUsers(Vec<UserId>),

    #[serde(rename = "new_message")]
    NewMessage(MessageRecord),

    #[serde(rename = "new_message_notification")]
    NewMessageNotification(MessageRecord),

    #[serde(rename = "msg:sent", rename_all = "camelCase")]
    MessageSent {
        temp_id: String,
        message_id: i64,
        message: MessageRecord,
        status: MessageStatus,
    },

    #[serde(rename = "msg:error", rename_all = "camelCase")]
    MessageError { temp_id: String, error: String },

    #[serde(rename = "msg:status_update", rename_all = "camelCase")]
    MessageStatusUpdate {
        message_id: i64,
        status: MessageStatus,
        conversation_id: i64,
    },

    #[serde(rename = "msg:seen_update", rename_all = "camelCase")]
    MessageSeenUpdate {
        conversation_id: i64,
        reader_id: UserId,
        last_seen_message_id: i64,
    },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart {
        user_id: UserId,
        conversation_id: i64,
    },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop {
        user_id: UserId,
        conversation_id: i64,
    },

    #[serde(rename = "call_incoming", rename_all = "camelCase")]
    CallIncoming {
        signal: Value,
        from: Value,
        call_type: String,
    },

    #[serde(rename = "call_answered")]
    CallAnswered { signal: Value },

    #[serde(rename = "ice_candidate")]
    IceCandidate { candidate: Value },

    #[serde(rename = "call_ended")]
    CallEnded,

    #[serde(rename = "message_deleted", rename_all = "camelCase")]
    MessageDeleted { message_id: i64 },

    #[serde(rename = "conversation_removed", rename_all = "camelCase")]
    ConversationRemoved { conversation_id: i64 },

    #[serde(rename = "conversation_cleared")]
    ConversationCleared,
}
