use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{Call, CallHistoryEntry, CallStatus, User};
use crate::schema::{calls, users};

use super::PgStore;

impl PgStore {
    pub async fn create_call(&self, caller_id: i64, receiver_id: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::insert_into(calls::table)
            .values((
                calls::caller_id.eq(caller_id),
                calls::receiver_id.eq(receiver_id),
                calls::status.eq(CallStatus::Initiated),
                calls::started_at.eq(Utc::now()),
            ))
            .returning(calls::id)
            .get_result(&mut conn)
            .await?)
    }

    pub async fn update_call_status(
        &self,
        call_id: i64,
        status: CallStatus,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        if status.is_terminal() {
            diesel::update(calls::table.filter(calls::id.eq(call_id)))
                .set((calls::status.eq(status), calls::ended_at.eq(Utc::now())))
                .execute(&mut conn)
                .await?;
        } else {
            diesel::update(calls::table.filter(calls::id.eq(call_id)))
                .set(calls::status.eq(status))
                .execute(&mut conn)
                .await?;
        }

        Ok(())
    }

    /// A user's call history, newest first, with both parties' display info.
    pub async fn call_history(&self, user_id: i64) -> Result<Vec<CallHistoryEntry>, StoreError> {
        let mut conn = self.conn().await?;

        let records: Vec<Call> = calls::table
            .filter(
                calls::caller_id
                    .eq(user_id)
                    .or(calls::receiver_id.eq(user_id)),
            )
            .order(calls::started_at.desc())
            .load(&mut conn)
            .await?;

        let mut user_ids: Vec<i64> = records
            .iter()
            .flat_map(|c| [c.caller_id, c.receiver_id])
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let parties: Vec<User> = users::table
            .filter(users::id.eq_any(&user_ids))
            .load(&mut conn)
            .await?;
        let parties: HashMap<i64, User> = parties.into_iter().map(|u| (u.id, u)).collect();

        Ok(records
            .into_iter()
            .map(|call| {
                let caller = parties.get(&call.caller_id);
                let receiver = parties.get(&call.receiver_id);
                CallHistoryEntry {
                    caller_name: caller.and_then(|u| u.username.clone()),
                    caller_avatar: caller.and_then(|u| u.profile_picture.clone()),
                    receiver_name: receiver.and_then(|u| u.username.clone()),
                    receiver_avatar: receiver.and_then(|u| u.profile_picture.clone()),
                    call,
                }
            })
            .collect())
    }
}
