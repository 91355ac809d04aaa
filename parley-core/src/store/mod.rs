mod calls;
mod conversations;
mod messages;
mod otp;
mod users;

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{DbConnection, DbPool};
use crate::error::StoreError;
use crate::models::{Message, MessageRecord, MessageStatus, NewMessage};

pub use otp::generate_code;

/// Concrete persistence gateway over Postgres. HTTP handlers use it directly;
/// the realtime coordinator sees it through [`DeliveryStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        PgStore { pool }
    }

    pub(crate) async fn conn(&self) -> Result<DbConnection, StoreError> {
        Ok(self.pool.get().await?)
    }
}

/// The slice of the persistence gateway the message delivery coordinator
/// consumes. Kept as a trait so delivery semantics can be exercised against
/// an in-memory store.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persist a message with status `sent` and return the full record,
    /// including the sender's display info.
    async fn create_message(&self, new: NewMessage) -> Result<MessageRecord, StoreError>;

    async fn message_by_id(&self, message_id: i64) -> Result<Option<Message>, StoreError>;

    async fn conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<i64>, StoreError>;

    /// Advance a message's status, never backward. Returns the number of rows
    /// that actually moved (0 when the message was already at or past the
    /// target status).
    async fn advance_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<usize, StoreError>;

    /// Mark every message in the conversation authored by someone other than
    /// `reader_id` as read. Returns the number of messages transitioned.
    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        reader_id: i64,
    ) -> Result<usize, StoreError>;

    async fn delete_message(&self, message_id: i64) -> Result<(), StoreError>;

    async fn delete_conversation(&self, conversation_id: i64) -> Result<(), StoreError>;

    /// Delete all messages in a conversation, keeping the conversation row.
    async fn clear_conversation(&self, conversation_id: i64) -> Result<usize, StoreError>;
}

#[async_trait]
impl DeliveryStore for PgStore {
    async fn create_message(&self, new: NewMessage) -> Result<MessageRecord, StoreError> {
        PgStore::insert_message(self, new).await
    }

    async fn message_by_id(&self, message_id: i64) -> Result<Option<Message>, StoreError> {
        PgStore::find_message(self, message_id).await
    }

    async fn conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        PgStore::participants(self, conversation_id).await
    }

    async fn advance_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<usize, StoreError> {
        PgStore::advance_status(self, message_id, status).await
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        reader_id: i64,
    ) -> Result<usize, StoreError> {
        PgStore::mark_read(self, conversation_id, reader_id).await
    }

    async fn delete_message(&self, message_id: i64) -> Result<(), StoreError> {
        PgStore::remove_message(self, message_id).await
    }

    async fn delete_conversation(&self, conversation_id: i64) -> Result<(), StoreError> {
        PgStore::remove_conversation(self, conversation_id).await
    }

    async fn clear_conversation(&self, conversation_id: i64) -> Result<usize, StoreError> {
        PgStore::remove_conversation_messages(self, conversation_id).await
    }
}
