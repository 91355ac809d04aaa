use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::Rng;

use crate::error::StoreError;
use crate::models::OtpSession;
use crate::schema::otp_sessions;

use super::PgStore;

/// Six decimal digits, zero-padding excluded by the range.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

impl PgStore {
    /// One pending code per phone number; a re-request replaces the previous
    /// code and restarts the expiry window.
    pub async fn upsert_otp(
        &self,
        phone_number: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut conn = self.conn().await?;
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);

        let existing: Option<i64> = otp_sessions::table
            .filter(otp_sessions::phone_number.eq(phone_number))
            .select(otp_sessions::id)
            .first(&mut conn)
            .await
            .optional()?;

        if let Some(id) = existing {
            diesel::update(otp_sessions::table.filter(otp_sessions::id.eq(id)))
                .set((
                    otp_sessions::code.eq(code),
                    otp_sessions::expires_at.eq(expires_at),
                ))
                .execute(&mut conn)
                .await?;
        } else {
            diesel::insert_into(otp_sessions::table)
                .values((
                    otp_sessions::phone_number.eq(phone_number),
                    otp_sessions::code.eq(code),
                    otp_sessions::expires_at.eq(expires_at),
                    otp_sessions::created_at.eq(Utc::now()),
                ))
                .execute(&mut conn)
                .await?;
        }

        Ok(expires_at)
    }

    /// Verify a code and consume it on success. Expired codes are rejected
    /// even when they match.
    pub async fn verify_otp(&self, phone_number: &str, code: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let session: Option<OtpSession> = otp_sessions::table
            .filter(otp_sessions::phone_number.eq(phone_number))
            .first(&mut conn)
            .await
            .optional()?;

        let Some(session) = session else {
            return Ok(false);
        };

        if session.code != code {
            tracing::debug!(phone_number, "OTP mismatch");
            return Ok(false);
        }

        if Utc::now() > session.expires_at {
            tracing::debug!(phone_number, "OTP expired");
            return Ok(false);
        }

        diesel::delete(otp_sessions::table.filter(otp_sessions::id.eq(session.id)))
            .execute(&mut conn)
            .await?;

        Ok(true)
    }

    pub async fn purge_expired_otps(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let purged = diesel::delete(
            otp_sessions::table.filter(otp_sessions::expires_at.lt(Utc::now())),
        )
        .execute(&mut conn)
        .await?;
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
