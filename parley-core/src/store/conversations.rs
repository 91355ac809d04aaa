use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::error::StoreError;
use crate::models::{ConversationKind, ConversationSummary, Message, User};
use crate::schema::{conversation_participants, conversations, messages, users};

use super::PgStore;

impl PgStore {
    /// An individual conversation is unique per unordered participant pair:
    /// look the pair up before creating anything.
    pub async fn find_or_create_individual(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;

        let cp_a = diesel::alias!(crate::schema::conversation_participants as cp_a);
        let convs_of_a = cp_a
            .filter(cp_a.field(conversation_participants::user_id).eq(user_a))
            .select(cp_a.field(conversation_participants::conversation_id));

        let existing: Option<i64> = conversation_participants::table
            .inner_join(conversations::table)
            .filter(conversation_participants::user_id.eq(user_b))
            .filter(conversations::kind.eq(ConversationKind::Individual))
            .filter(conversation_participants::conversation_id.eq_any(convs_of_a))
            .select(conversation_participants::conversation_id)
            .first(&mut conn)
            .await
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id = conn
            .transaction::<_, StoreError, _>(|conn| {
                async move {
                    let conversation_id: i64 = diesel::insert_into(conversations::table)
                        .values((
                            conversations::kind.eq(ConversationKind::Individual),
                            conversations::created_at.eq(Utc::now()),
                        ))
                        .returning(conversations::id)
                        .get_result(conn)
                        .await?;

                    diesel::insert_into(conversation_participants::table)
                        .values(vec![
                            (
                                conversation_participants::conversation_id.eq(conversation_id),
                                conversation_participants::user_id.eq(user_a),
                            ),
                            (
                                conversation_participants::conversation_id.eq(conversation_id),
                                conversation_participants::user_id.eq(user_b),
                            ),
                        ])
                        .execute(conn)
                        .await?;

                    Ok(conversation_id)
                }
                .scope_boxed()
            })
            .await?;

        Ok(id)
    }

    pub(super) async fn participants(&self, conversation_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conversation_id))
            .select(conversation_participants::user_id)
            .load(&mut conn)
            .await?)
    }

    /// Conversation list for a user: other participant, latest message, and
    /// unread count per conversation, most recently active first.
    pub async fn conversations_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut conn = self.conn().await?;

        let memberships: Vec<(i64, ConversationKind, chrono::DateTime<Utc>)> =
            conversation_participants::table
                .inner_join(conversations::table)
                .filter(conversation_participants::user_id.eq(user_id))
                .select((
                    conversations::id,
                    conversations::kind,
                    conversations::created_at,
                ))
                .load(&mut conn)
                .await?;

        let mut summaries = Vec::with_capacity(memberships.len());
        for (conversation_id, kind, created_at) in memberships {
            let other: Option<User> = conversation_participants::table
                .inner_join(users::table)
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.ne(user_id))
                .select(users::all_columns)
                .first(&mut conn)
                .await
                .optional()?;

            let Some(other) = other else {
                // Participantless conversation, nothing to show.
                continue;
            };

            let last: Option<Message> = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .order(messages::id.desc())
                .first(&mut conn)
                .await
                .optional()?;

            let unread_count: i64 = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::is_read.eq(false))
                .filter(messages::sender_id.ne(user_id))
                .count()
                .get_result(&mut conn)
                .await?;

            summaries.push(ConversationSummary {
                id: conversation_id,
                kind,
                created_at,
                other_user_id: other.id,
                other_username: other.username,
                other_phone: other.phone_number,
                other_avatar: other.profile_picture,
                last_message: last.as_ref().and_then(|m| m.content.clone()),
                last_message_time: last.as_ref().map(|m| m.created_at),
                last_message_kind: last.as_ref().map(|m| m.kind),
                unread_count,
            });
        }

        summaries.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(summaries)
    }

    pub(super) async fn remove_conversation(&self, conversation_id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                diesel::delete(
                    messages::table.filter(messages::conversation_id.eq(conversation_id)),
                )
                .execute(conn)
                .await?;

                diesel::delete(conversation_participants::table.filter(
                    conversation_participants::conversation_id.eq(conversation_id),
                ))
                .execute(conn)
                .await?;

                diesel::delete(conversations::table.filter(conversations::id.eq(conversation_id)))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
