use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::repo::{User, UserType};

/// Token type: `access` authenticates requests, `registration` carries a
/// pending registration through the credential-completion step.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Registration")]
    Registration,
}

/// JWT claims used in the app.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>, // set on access tokens, absent on registration tokens
    pub exp: usize,      // expiration time
    pub iat: usize,      // issued at
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub kind: TokenKind,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub registration_ttl: Duration,
}

/// Request body for the phone-verification step. Fields are optional so the
/// handler can report missing ones itself instead of a bare 422.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneVerifyRequest {
    pub phone_number: Option<String>,
    pub user_type: Option<UserType>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Response of the phone-verification step; `exists` is only present when
/// the phone number is already registered.
#[derive(Debug, Serialize)]
pub struct PhoneVerifyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    pub message: String,
}

/// Request body for credential completion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistrationRequest {
    pub email: String,
    pub password: String,
    pub user_type: UserType,
    pub company: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistrationResponse {
    pub message: String,
    pub redirect_to: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub user: PublicUser,
    pub token: String,
    pub redirect_to: String,
}

/// Already-verified profile handed over by the external identity provider.
#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Either a full sign-in (`user` + `token`) or just a redirect to the phone
/// step when the account is not complete yet.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub redirect_to: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone().unwrap_or_default(),
            name: user.name.clone(),
            user_type: user.user_type,
            company: user.company.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            image: user.image.clone(),
            user_type: user.user_type,
            company: user.company.clone(),
        }
    }
}
