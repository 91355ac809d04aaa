use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::StoreError;
use crate::models::User;
use crate::schema::users;

use super::PgStore;

impl PgStore {
    pub async fn user_by_phone(&self, phone_number: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table
            .filter(users::phone_number.eq(phone_number))
            .first(&mut conn)
            .await
            .optional()?)
    }

    pub async fn user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()?)
    }

    pub async fn create_user(&self, phone_number: &str) -> Result<User, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::insert_into(users::table)
            .values((
                users::phone_number.eq(phone_number),
                users::created_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)
            .await?)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        username: Option<&str>,
        profile_picture: Option<&str>,
    ) -> Result<User, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::update(users::table.filter(users::id.eq(user_id)))
            .set((
                users::username.eq(username),
                users::profile_picture.eq(profile_picture),
            ))
            .get_result(&mut conn)
            .await?)
    }
}
