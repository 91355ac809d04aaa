use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::StoreError;
use crate::models::{Message, MessageRecord, MessageStatus, NewMessage};
use crate::schema::{messages, users};

use super::PgStore;

impl PgStore {
    pub(super) async fn insert_message(&self, new: NewMessage) -> Result<MessageRecord, StoreError> {
        let mut conn = self.conn().await?;

        let message: Message = diesel::insert_into(messages::table)
            .values((
                messages::conversation_id.eq(new.conversation_id),
                messages::sender_id.eq(new.sender_id),
                messages::content.eq(&new.content),
                messages::kind.eq(new.kind),
                messages::file_url.eq(&new.file_url),
                messages::status.eq(MessageStatus::Sent),
                messages::is_read.eq(false),
                messages::created_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)
            .await?;

        let sender: Option<(Option<String>, Option<String>)> = users::table
            .filter(users::id.eq(message.sender_id))
            .select((users::username, users::profile_picture))
            .first(&mut conn)
            .await
            .optional()?;

        let (sender_name, sender_avatar) = sender.unwrap_or((None, None));
        Ok(MessageRecord::from_parts(message, sender_name, sender_avatar))
    }

    pub(super) async fn find_message(&self, message_id: i64) -> Result<Option<Message>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(messages::table
            .filter(messages::id.eq(message_id))
            .first(&mut conn)
            .await
            .optional()?)
    }

    /// Cursor page: messages older than `cursor` (all newest when absent),
    /// fetched descending by id then reversed to chronological order.
    pub async fn message_page(
        &self,
        conversation_id: i64,
        cursor: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let mut conn = self.conn().await?;

        let mut query = messages::table
            .inner_join(users::table)
            .filter(messages::conversation_id.eq(conversation_id))
            .order(messages::id.desc())
            .limit(limit)
            .select((
                messages::all_columns,
                users::username,
                users::profile_picture,
            ))
            .into_boxed();

        if let Some(cursor) = cursor {
            query = query.filter(messages::id.lt(cursor));
        }

        let rows: Vec<(Message, Option<String>, Option<String>)> =
            query.load(&mut conn).await?;

        let mut records: Vec<MessageRecord> = rows
            .into_iter()
            .map(|(message, name, avatar)| MessageRecord::from_parts(message, name, avatar))
            .collect();
        records.reverse();
        Ok(records)
    }

    pub(super) async fn advance_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;

        let affected = match status {
            // `sent` is the initial state, not a transition target.
            MessageStatus::Sent => 0,
            MessageStatus::Delivered => {
                diesel::update(messages::table)
                    .filter(messages::id.eq(message_id))
                    .filter(messages::status.eq(MessageStatus::Sent))
                    .set((
                        messages::status.eq(MessageStatus::Delivered),
                        messages::delivered_at.eq(Utc::now()),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            MessageStatus::Read => {
                diesel::update(messages::table)
                    .filter(messages::id.eq(message_id))
                    .filter(messages::status.ne(MessageStatus::Read))
                    .set((
                        messages::status.eq(MessageStatus::Read),
                        messages::is_read.eq(true),
                        messages::read_at.eq(Utc::now()),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };

        Ok(affected)
    }

    pub(super) async fn mark_read(
        &self,
        conversation_id: i64,
        reader_id: i64,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;

        let affected = diesel::update(messages::table)
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::sender_id.ne(reader_id))
            .filter(messages::status.ne(MessageStatus::Read))
            .set((
                messages::status.eq(MessageStatus::Read),
                messages::is_read.eq(true),
                messages::read_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(affected)
    }

    pub(super) async fn remove_message(&self, message_id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::delete(messages::table.filter(messages::id.eq(message_id)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub(super) async fn remove_conversation_messages(
        &self,
        conversation_id: i64,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let affected =
            diesel::delete(messages::table.filter(messages::conversation_id.eq(conversation_id)))
                .execute(&mut conn)
                .await?;
        Ok(affected)
    }
}
