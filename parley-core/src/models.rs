use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Message lifecycle. Transitions are monotonic: `sent -> delivered -> read`,
/// never backward. Variant order carries the ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl ToSql<Text, Pg> for MessageStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for MessageStatus {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes() {
            b"sent" => Ok(MessageStatus::Sent),
            b"delivered" => Ok(MessageStatus::Delivered),
            b"read" => Ok(MessageStatus::Read),
            other => Err(format!(
                "unrecognized message status: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

/// What a message carries. File-bearing kinds reference an uploaded file by
/// URL and leave `content` empty; `text` is the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Audio,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::File => "file",
            MessageKind::Audio => "audio",
        }
    }

    pub fn is_file_bearing(self) -> bool {
        !matches!(self, MessageKind::Text)
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Text
    }
}

impl ToSql<Text, Pg> for MessageKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for MessageKind {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes() {
            b"text" => Ok(MessageKind::Text),
            b"image" => Ok(MessageKind::Image),
            b"video" => Ok(MessageKind::Video),
            b"file" => Ok(MessageKind::File),
            b"audio" => Ok(MessageKind::Audio),
            other => Err(format!(
                "unrecognized message kind: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Individual,
    Group,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationKind::Individual => "individual",
            ConversationKind::Group => "group",
        }
    }
}

impl ToSql<Text, Pg> for ConversationKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ConversationKind {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes() {
            b"individual" => Ok(ConversationKind::Individual),
            b"group" => Ok(ConversationKind::Group),
            other => Err(format!(
                "unrecognized conversation kind: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

/// Call record lifecycle: created as `initiated`; any of the other states may
/// follow. `ended` and `missed` stamp the end timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initiated,
    Ongoing,
    Ended,
    Missed,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Ongoing => "ongoing",
            CallStatus::Ended => "ended",
            CallStatus::Missed => "missed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Missed)
    }
}

impl ToSql<Text, Pg> for CallStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for CallStatus {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes() {
            b"initiated" => Ok(CallStatus::Initiated),
            b"ongoing" => Ok(CallStatus::Ongoing),
            b"ended" => Ok(CallStatus::Ended),
            b"missed" => Ok(CallStatus::Missed),
            other => Err(format!(
                "unrecognized call status: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, diesel::Queryable)]
pub struct User {
    pub id: i64,
    pub phone_number: String,
    pub username: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, diesel::Queryable)]
pub struct OtpSession {
    pub id: i64,
    pub phone_number: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, diesel::Queryable)]
pub struct Conversation {
    pub id: i64,
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, diesel::Queryable)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub status: MessageStatus,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// A persisted message joined with its sender's display info. This is the
/// shape broadcast on the wire and returned from message endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub status: MessageStatus,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
}

impl MessageRecord {
    pub fn from_parts(
        message: Message,
        sender_name: Option<String>,
        sender_avatar: Option<String>,
    ) -> Self {
        MessageRecord {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            file_url: message.file_url,
            status: message.status,
            is_read: message.is_read,
            created_at: message.created_at,
            delivered_at: message.delivered_at,
            read_at: message.read_at,
            sender_name,
            sender_avatar,
        }
    }
}

/// Input to message creation, already normalized: exactly one of `content` /
/// `file_url` is populated depending on `kind`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub file_url: Option<String>,
}

/// One row of the conversation list: the conversation, the other participant,
/// the latest message, and the caller's unread count.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub other_user_id: i64,
    pub other_username: Option<String>,
    pub other_phone: String,
    pub other_avatar: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(rename = "last_message_type")]
    pub last_message_kind: Option<MessageKind>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, diesel::Queryable)]
pub struct Call {
    pub id: i64,
    pub caller_id: i64,
    pub receiver_id: i64,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallHistoryEntry {
    #[serde(flatten)]
    pub call: Call,
    pub caller_name: Option<String>,
    pub caller_avatar: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_avatar: Option<String>,
}
