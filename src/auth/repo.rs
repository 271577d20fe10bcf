use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Declared role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_type", rename_all = "lowercase")]
pub enum UserType {
    Jobseeker,
    Employer,
}

/// Progress marker of the multi-step registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "registration_step", rename_all = "kebab-case")]
pub enum RegistrationStep {
    PhoneVerified,
    Completed,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 hash; absent means social-only or pending
    pub name: Option<String>,
    pub company: Option<String>,
    pub user_type: UserType,
    pub admin: bool,
    pub image: Option<String>,
    pub registration_step: RegistrationStep,
    pub created_at: OffsetDateTime,
}

/// Fields of a record created by the phone-verification step.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub phone_number: &'a str,
    pub user_type: UserType,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub image: Option<&'a str>,
    pub registration_step: RegistrationStep,
}

impl User {
    pub async fn find_by_phone(db: &PgPool, phone_number: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, email, password_hash, name, company,
                   user_type, admin, image, registration_step, created_at
            FROM users
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, email, password_hash, name, company,
                   user_type, admin, image, registration_step, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, email, password_hash, name, company,
                   user_type, admin, image, registration_step, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Create a record from a phone-verification submission. Duplicate phone
    /// numbers or emails surface as unique-constraint violations.
    pub async fn create(db: &PgPool, new: &NewUser<'_>) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (phone_number, user_type, email, name, image, registration_step)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, phone_number, email, password_hash, name, company,
                      user_type, admin, image, registration_step, created_at
            "#,
        )
        .bind(new.phone_number)
        .bind(new.user_type)
        .bind(new.email)
        .bind(new.name)
        .bind(new.image)
        .bind(new.registration_step)
        .fetch_one(db)
        .await
    }

    /// Merge a phone submission into the record matching a social email:
    /// sets phone and role, completes the step, and backfills the avatar
    /// only when the record has none.
    pub async fn merge_social_identity(
        db: &PgPool,
        id: Uuid,
        phone_number: &str,
        user_type: UserType,
        image: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET phone_number = $2,
                user_type = $3,
                registration_step = 'completed',
                image = COALESCE(image, $4)
            WHERE id = $1
            RETURNING id, phone_number, email, password_hash, name, company,
                      user_type, admin, image, registration_step, created_at
            "#,
        )
        .bind(id)
        .bind(phone_number)
        .bind(user_type)
        .bind(image)
        .fetch_optional(db)
        .await
    }

    /// Finish registration for a pending record. Conditional on the record
    /// still being phone-verified, so a replayed session can never overwrite
    /// a completed account.
    pub async fn complete_registration(
        db: &PgPool,
        id: Uuid,
        email: &str,
        password_hash: &str,
        user_type: UserType,
        name: Option<&str>,
        company: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2,
                password_hash = $3,
                user_type = $4,
                name = $5,
                company = $6,
                registration_step = 'completed'
            WHERE id = $1 AND registration_step = 'phone-verified'
            RETURNING id, phone_number, email, password_hash, name, company,
                      user_type, admin, image, registration_step, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(user_type)
        .bind(name)
        .bind(company)
        .fetch_optional(db)
        .await
    }

    /// Set the avatar if the record has none yet.
    pub async fn backfill_image(db: &PgPool, id: Uuid, image: &str) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET image = $2
            WHERE id = $1 AND image IS NULL
            "#,
        )
        .bind(id)
        .bind(image)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_round_trips_through_serde() {
        assert_eq!(
            serde_json::to_string(&UserType::Jobseeker).unwrap(),
            r#""jobseeker""#
        );
        let parsed: UserType = serde_json::from_str(r#""employer""#).unwrap();
        assert_eq!(parsed, UserType::Employer);
    }

    #[test]
    fn registration_step_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RegistrationStep::PhoneVerified).unwrap(),
            r#""phone-verified""#
        );
        assert_eq!(
            serde_json::to_string(&RegistrationStep::Completed).unwrap(),
            r#""completed""#
        );
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            phone_number: "9999999999".into(),
            email: Some("e@x.com".into()),
            password_hash: Some("$argon2id$secret".into()),
            name: None,
            company: None,
            user_type: UserType::Jobseeker,
            admin: false,
            image: None,
            registration_step: RegistrationStep::Completed,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
    }
}
