pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo::{RegistrationStep, User, UserType};
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Phone numbers are stored as bare digit strings.
pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

pub(crate) fn is_valid_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            registration_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            registration_ttl: Duration::from_secs((registration_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign(&self, user_id: Uuid, email: Option<String>, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Registration => self.registration_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            email,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    /// Token presented on authenticated requests via `Authorization: Bearer`.
    pub fn sign_access(&self, user_id: Uuid, email: Option<String>) -> anyhow::Result<String> {
        self.sign(user_id, email, TokenKind::Access)
    }

    /// Short-lived token tying the credential step to a pending record.
    /// Travels in the `registration_id` cookie, never in a header.
    pub fn sign_registration(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, None, TokenKind::Registration)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    /// Validate a registration cookie value and return the pending record id.
    /// An access token in the cookie is rejected outright.
    pub fn verify_registration(&self, token: &str) -> anyhow::Result<Uuid> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Registration {
            anyhow::bail!("not a registration token");
        }
        Ok(claims.sub)
    }
}

pub const REGISTRATION_COOKIE: &str = "registration_id";

pub fn registration_cookie(token: String, ttl: Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(REGISTRATION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(TimeDuration::seconds(ttl.as_secs() as i64));
    cookie
}

pub fn expired_registration_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(REGISTRATION_COOKIE, "");
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(TimeDuration::ZERO);
    cookie
}

/// URL the client is sent to when social sign-in finds no completed account:
/// the phone step, carrying the provider profile as query parameters.
pub(crate) fn phone_step_redirect(email: &str, name: Option<&str>, image: Option<&str>) -> String {
    let mut url = format!("/SignUp/phoneNumber?email={}", urlencoding::encode(email));
    if let Some(name) = name {
        url.push_str("&name=");
        url.push_str(&urlencoding::encode(name));
    }
    if let Some(image) = image {
        url.push_str("&image=");
        url.push_str(&urlencoding::encode(image));
    }
    url
}

/// Outcome of matching a phone-verification submission against the records
/// already on file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityResolution {
    /// The phone number is taken. No mutation.
    AlreadyRegistered,
    /// A record owns the submitted email; adopt the phone into it.
    Merge { user_id: Uuid },
    /// Nothing matches; create a record at the given step.
    Create(RegistrationStep),
}

/// Decide create vs merge vs reject. The phone check wins: a taken phone
/// reports `AlreadyRegistered` even when the email also matches a record.
/// With an email present the created record is already complete (social
/// sign-up); without one it waits for the credential step.
pub fn resolve_identity(
    phone_taken: bool,
    email_match: Option<Uuid>,
    has_email: bool,
) -> IdentityResolution {
    if phone_taken {
        return IdentityResolution::AlreadyRegistered;
    }
    if let Some(user_id) = email_match {
        return IdentityResolution::Merge { user_id };
    }
    if has_email {
        IdentityResolution::Create(RegistrationStep::Completed)
    } else {
        IdentityResolution::Create(RegistrationStep::PhoneVerified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateJob,
    TransitionJobStatus,
    CompleteRegistration,
}

/// Who is asking. Authorization is decided from this alone, before any
/// read or write touches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User { user_type: UserType, admin: bool },
    Registrant,
}

impl Actor {
    pub fn of(user: &User) -> Self {
        Actor::User {
            user_type: user.user_type,
            admin: user.admin,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        match (self, capability) {
            (
                Actor::User {
                    user_type: UserType::Employer,
                    ..
                },
                Capability::CreateJob,
            ) => true,
            (Actor::User { admin: true, .. }, Capability::TransitionJobStatus) => true,
            (Actor::Registrant, Capability::CompleteRegistration) => true,
            _ => false,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.can(capability) {
            return Ok(());
        }
        let message = match capability {
            Capability::CreateJob => "Only employers can post jobs",
            Capability::TransitionJobStatus => "Only admins can update job status",
            Capability::CompleteRegistration => "Phone verification required",
        };
        warn!(actor = ?self, capability = ?capability, "capability denied");
        Err(ApiError::Forbidden(message.to_string()))
    }
}

/// The authenticated user behind a bearer token, loaded fresh per request.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        if claims.kind != TokenKind::Access {
            warn!(kind = ?claims.kind, "wrong token kind on bearer auth");
            return Err(ApiError::Unauthorized("Access token required".to_string()));
        }

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod validator_tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn phone_must_be_digits_only() {
        assert!(is_valid_phone("4915731234567"));
        assert!(is_valid_phone("015731234567"));
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("+4915731234567"));
        assert!(!is_valid_phone("1573 123456"));
        assert!(!is_valid_phone("phone"));
    }

    #[test]
    fn password_length_floor() {
        assert!(is_valid_password("12345678"));
        assert!(!is_valid_password("1234567"));
        assert!(!is_valid_password(""));
    }
}


#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys
            .sign_access(user_id, Some("user@example.com".into()))
            .expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn registration_token_round_trip() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_registration(user_id).expect("sign registration");
        let resolved = keys.verify_registration(&token).expect("verify registration");
        assert_eq!(resolved, user_id);
    }

    #[tokio::test]
    async fn verify_registration_rejects_access_token() {
        let keys = make_keys();
        let token = keys
            .sign_access(Uuid::new_v4(), None)
            .expect("sign access");
        let err = keys.verify_registration(&token).unwrap_err();
        assert!(err.to_string().contains("not a registration token"));
    }

    #[tokio::test]
    async fn verify_rejects_tampered_token() {
        let keys = make_keys();
        let token = keys.sign_access(Uuid::new_v4(), None).expect("sign access");
        let mut tampered = token;
        tampered.pop();
        assert!(keys.verify(&tampered).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_foreign_audience() {
        let keys = make_keys();
        let foreign = JwtKeys {
            encoding: keys.encoding.clone(),
            decoding: keys.decoding.clone(),
            issuer: keys.issuer.clone(),
            audience: "another-service".to_string(),
            access_ttl: keys.access_ttl,
            registration_ttl: keys.registration_ttl,
        };
        let token = keys.sign_access(Uuid::new_v4(), None).expect("sign access");
        assert!(foreign.verify(&token).is_err());
    }
}


#[cfg(test)]
mod resolution_tests {
    use super::*;

    #[test]
    fn taken_phone_rejects_even_with_matching_email() {
        let other = Uuid::new_v4();
        assert_eq!(
            resolve_identity(true, Some(other), true),
            IdentityResolution::AlreadyRegistered
        );
        assert_eq!(
            resolve_identity(true, None, false),
            IdentityResolution::AlreadyRegistered
        );
    }

    #[test]
    fn email_match_merges() {
        let user_id = Uuid::new_v4();
        assert_eq!(
            resolve_identity(false, Some(user_id), true),
            IdentityResolution::Merge { user_id }
        );
    }

    #[test]
    fn fresh_social_submission_creates_completed() {
        assert_eq!(
            resolve_identity(false, None, true),
            IdentityResolution::Create(RegistrationStep::Completed)
        );
    }

    #[test]
    fn fresh_phone_only_submission_creates_pending() {
        assert_eq!(
            resolve_identity(false, None, false),
            IdentityResolution::Create(RegistrationStep::PhoneVerified)
        );
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;

    fn employer() -> Actor {
        Actor::User {
            user_type: UserType::Employer,
            admin: false,
        }
    }

    fn jobseeker() -> Actor {
        Actor::User {
            user_type: UserType::Jobseeker,
            admin: false,
        }
    }

    fn admin_jobseeker() -> Actor {
        Actor::User {
            user_type: UserType::Jobseeker,
            admin: true,
        }
    }

    #[test]
    fn employers_post_jobs_and_nobody_else() {
        assert!(employer().can(Capability::CreateJob));
        assert!(!jobseeker().can(Capability::CreateJob));
        assert!(!Actor::Registrant.can(Capability::CreateJob));
    }

    #[test]
    fn only_admins_transition_job_status() {
        assert!(admin_jobseeker().can(Capability::TransitionJobStatus));
        assert!(!employer().can(Capability::TransitionJobStatus));
        assert!(!jobseeker().can(Capability::TransitionJobStatus));
        assert!(!Actor::Registrant.can(Capability::TransitionJobStatus));
    }

    #[test]
    fn only_registrants_complete_registration() {
        assert!(Actor::Registrant.can(Capability::CompleteRegistration));
        assert!(!employer().can(Capability::CompleteRegistration));
        assert!(!admin_jobseeker().can(Capability::CompleteRegistration));
    }

    #[test]
    fn require_names_the_denied_action() {
        let err = jobseeker().require(Capability::CreateJob).unwrap_err();
        assert_eq!(err.to_string(), "Only employers can post jobs");
        let err = employer()
            .require(Capability::TransitionJobStatus)
            .unwrap_err();
        assert_eq!(err.to_string(), "Only admins can update job status");
        let err = employer()
            .require(Capability::CompleteRegistration)
            .unwrap_err();
        assert_eq!(err.to_string(), "Phone verification required");
    }
}
