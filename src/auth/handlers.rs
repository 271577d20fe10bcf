use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            CompleteRegistrationRequest, CompleteRegistrationResponse, LoginRequest,
            LoginResponse, PhoneVerifyRequest, PhoneVerifyResponse, ProfileResponse, PublicUser,
            SocialLoginRequest, SocialLoginResponse,
        },
        repo::{NewUser, RegistrationStep, User, UserType},
        services::{
            expired_registration_cookie, hash_password, is_valid_email, is_valid_password,
            is_valid_phone, phone_step_redirect, registration_cookie, resolve_identity,
            verify_password, Actor, Capability, CurrentUser, IdentityResolution, JwtKeys,
            REGISTRATION_COOKIE,
        },
    },
    error::{is_unique_violation, violated_constraint, ApiError},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/registration/phone", post(verify_phone))
        .route("/registration/complete", post(complete_registration))
        .route("/login", post(login))
        .route("/auth/social", post(social_login))
        .route("/profile", get(get_profile))
}

/// First registration step. Decides between rejecting a taken phone number,
/// merging into the record that owns the submitted social email, and
/// creating a fresh record. Creation without an email leaves the record
/// pending and hands the client a registration cookie for the credential
/// step.
#[instrument(skip(state, jar, payload))]
pub async fn verify_phone(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<PhoneVerifyRequest>,
) -> Result<(CookieJar, Json<PhoneVerifyResponse>), ApiError> {
    let phone = payload
        .phone_number
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    let Some(user_type) = payload.user_type else {
        warn!("phone submission without user type");
        return Err(ApiError::Validation(
            "Phone number and user type are required".into(),
        ));
    };
    if !is_valid_phone(phone) {
        warn!(phone = %phone, "phone must be digits only");
        return Err(ApiError::Validation(
            "Phone number and user type are required".into(),
        ));
    }

    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase);

    let phone_taken = User::find_by_phone(&state.db, phone).await?.is_some();
    let email_match = match email.as_deref() {
        Some(e) => User::find_by_email(&state.db, e).await?.map(|u| u.id),
        None => None,
    };

    match resolve_identity(phone_taken, email_match, email.is_some()) {
        IdentityResolution::AlreadyRegistered => {
            warn!(phone = %phone, "phone number already registered");
            Ok((
                jar,
                Json(PhoneVerifyResponse {
                    exists: Some(true),
                    message: "Phone number already exists".into(),
                }),
            ))
        }
        IdentityResolution::Merge { user_id } => {
            let merged = User::merge_social_identity(
                &state.db,
                user_id,
                phone,
                user_type,
                payload.image.as_deref(),
            )
            .await;
            match merged {
                Ok(Some(user)) => {
                    info!(user_id = %user.id, "phone submission merged into social account");
                    Ok((
                        jar,
                        Json(PhoneVerifyResponse {
                            exists: None,
                            message: "User updated successfully".into(),
                        }),
                    ))
                }
                Ok(None) => {
                    warn!(user_id = %user_id, "email match vanished before merge");
                    Err(ApiError::NotFound("User not found".into()))
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(phone = %phone, "phone number claimed concurrently");
                    Ok((
                        jar,
                        Json(PhoneVerifyResponse {
                            exists: Some(true),
                            message: "Phone number already exists".into(),
                        }),
                    ))
                }
                Err(e) => Err(e.into()),
            }
        }
        IdentityResolution::Create(step) => {
            let new = NewUser {
                phone_number: phone,
                user_type,
                email: email.as_deref(),
                name: payload.name.as_deref(),
                image: payload.image.as_deref(),
                registration_step: step,
            };
            match User::create(&state.db, &new).await {
                Ok(user) => {
                    let jar = if step == RegistrationStep::PhoneVerified {
                        let keys = JwtKeys::from_ref(&state);
                        let token = keys.sign_registration(user.id)?;
                        jar.add(registration_cookie(token, keys.registration_ttl))
                    } else {
                        jar
                    };
                    info!(user_id = %user.id, step = ?step, "phone number verified");
                    Ok((
                        jar,
                        Json(PhoneVerifyResponse {
                            exists: None,
                            message: "Phone number verified successfully".into(),
                        }),
                    ))
                }
                Err(e) if is_unique_violation(&e) => match violated_constraint(&e) {
                    Some("users_email_key") => {
                        warn!("email claimed concurrently");
                        Err(ApiError::Conflict("Email already registered".into()))
                    }
                    _ => {
                        warn!(phone = %phone, "phone number claimed concurrently");
                        Ok((
                            jar,
                            Json(PhoneVerifyResponse {
                                exists: Some(true),
                                message: "Phone number already exists".into(),
                            }),
                        ))
                    }
                },
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Second registration step. Only reachable with a valid registration
/// cookie; sets the credentials and flips the record to completed.
#[instrument(skip(state, jar, payload))]
pub async fn complete_registration(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<CompleteRegistrationRequest>,
) -> Result<(CookieJar, Json<CompleteRegistrationResponse>), ApiError> {
    let Some(cookie) = jar.get(REGISTRATION_COOKIE) else {
        warn!("completion attempt without registration cookie");
        return Err(ApiError::Validation("Phone verification required".into()));
    };

    let keys = JwtKeys::from_ref(&state);
    let pending_id = keys.verify_registration(cookie.value()).map_err(|e| {
        warn!(error = %e, "registration token rejected");
        ApiError::Validation("Registration session expired".into())
    })?;

    Actor::Registrant.require(Capability::CompleteRegistration)?;

    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if !is_valid_password(&payload.password) {
        warn!("password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    // Employers go by their company name; the company field is kept as well.
    let (name, company) = match payload.user_type {
        UserType::Employer => (payload.company.as_deref(), payload.company.as_deref()),
        UserType::Jobseeker => (payload.name.as_deref(), None),
    };

    let hash = hash_password(&payload.password)?;
    let completed = User::complete_registration(
        &state.db,
        pending_id,
        &email,
        &hash,
        payload.user_type,
        name,
        company,
    )
    .await;

    let user = match completed {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(user_id = %pending_id, "pending record missing or already completed");
            return Err(ApiError::Validation("Registration session expired".into()));
        }
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %email, "email claimed concurrently");
            return Err(ApiError::Conflict("Email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let jar = jar.add(expired_registration_cookie());
    info!(user_id = %user.id, "registration completed");
    Ok((
        jar,
        Json(CompleteRegistrationResponse {
            message: "Registration completed successfully".into(),
            redirect_to: "/".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(email = %email, "login with unknown email");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    // Social-only accounts have no password hash and cannot log in here.
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "login against passwordless account");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_access(user.id, user.email.clone())?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        user: PublicUser::from(&user),
        token,
        redirect_to: "/".into(),
    }))
}

/// Receives an already-verified profile from the external identity
/// provider. A completed account signs in; anything else is redirected to
/// the phone step carrying the profile.
#[instrument(skip(state, payload))]
pub async fn social_login(
    State(state): State<AppState>,
    Json(payload): Json<SocialLoginRequest>,
) -> Result<Json<SocialLoginResponse>, ApiError> {
    let Some(email) = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
    else {
        warn!("social sign-in without email");
        return Err(ApiError::Validation("Email is required".into()));
    };

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        info!("unknown social profile, redirecting to phone step");
        return Ok(Json(SocialLoginResponse {
            message: None,
            user: None,
            token: None,
            redirect_to: phone_step_redirect(
                &email,
                payload.name.as_deref(),
                payload.image.as_deref(),
            ),
        }));
    };

    if let Some(image) = payload.image.as_deref() {
        User::backfill_image(&state.db, user.id, image).await?;
    }

    if user.registration_step != RegistrationStep::Completed {
        info!(user_id = %user.id, "social profile known but registration incomplete");
        return Ok(Json(SocialLoginResponse {
            message: None,
            user: None,
            token: None,
            redirect_to: phone_step_redirect(
                &email,
                payload.name.as_deref(),
                payload.image.as_deref(),
            ),
        }));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_access(user.id, user.email.clone())?;

    info!(user_id = %user.id, "social sign-in");
    Ok(Json(SocialLoginResponse {
        message: Some("Login successful".into()),
        user: Some(PublicUser::from(&user)),
        token: Some(token),
        redirect_to: "/".into(),
    }))
}

#[instrument(skip(user))]
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&user))
}
