//! Account lifecycle: registration, login, passwords and email verification.

use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::claims::TokenPurpose;
use super::dto::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, PublicUser,
    RegisterRequest, RequestVerificationRequest, ResetPasswordRequest, UpdateProfileRequest,
    VerificationStatus, VerifyEmailRequest,
};
use super::jwt::JwtKeys;
use super::password::{hash_password, verify_password};
use super::repo::{normalize_email, set};
use super::repo_types::{PendingVerification, Theme, User};
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::mail::{self, templates, Mailer, OutgoingMail};
use crate::provisioning::{ProvisionReport, Provisioner};
use crate::resources::{guard, RefKind, Reference};
use crate::state::AppState;
use crate::store::{patch_of, timestamp_value, Repo};
use crate::validation::validate;

// Registrations serialize on one key so the email check and the insert
// cannot interleave.
const REGISTRATION_LOCK: Uuid = Uuid::nil();

#[derive(Clone)]
pub struct AccountService {
    users: Repo<User>,
    keys: JwtKeys,
    mailer: Arc<dyn Mailer>,
    mail_timeout: Duration,
    provisioner: Provisioner,
    locks: Arc<KeyedLocks>,
    app_base_url: String,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: Repo::new(state.store.clone(), state.store_timeout()),
            keys: JwtKeys::from_ref(state),
            mailer: state.mailer.clone(),
            mail_timeout: Duration::from_secs(state.config.mail.timeout_secs),
            provisioner: Provisioner::from_ref(state),
            locks: state.locks.clone(),
            app_base_url: state.config.app_base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn invalid_credentials() -> AppError {
    AppError::unauthorized("Invalid credentials")
}

fn invalid_token() -> AppError {
    AppError::unauthorized("invalid or expired token")
}

impl AccountService {
    fn session(&self, user: User) -> AppResult<AuthResponse> {
        let token = self.keys.sign_session(user.id).map_err(|e| {
            error!(error = %e, user_id = %user.id, "jwt sign session failed");
            AppError::internal(e.to_string())
        })?;
        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterRequest) -> AppResult<AuthResponse> {
        validate(&input)?;
        let email = normalize_email(&input.email);

        let user = {
            let _guard = self.locks.lock(REGISTRATION_LOCK).await;
            if User::find_by_email(&self.users, &email).await?.is_some() {
                warn!(%email, "email already registered");
                return Err(AppError::bad_request("email: already registered"));
            }
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: Uuid::new_v4(),
                name: input.name.trim().to_string(),
                email,
                password_hash: hash_password(&input.password)?,
                preferred_language: input.preferred_language.unwrap_or_default(),
                theme: Theme::default(),
                default_timer_preset: None,
                google_id: None,
                picture: None,
                email_verified: false,
                email_verified_at: None,
                email_verification: None,
                created_at: now,
                updated_at: now,
            };
            self.users.insert(&user).await?
        };

        // Optional setup never blocks account creation; POST /me/defaults repairs it.
        let user = match self.provisioner.ensure_defaults(user.id).await {
            Ok(_) => User::load(&self.users, user.id).await.unwrap_or(user),
            Err(e) => {
                warn!(error = %e, user_id = %user.id, "provisioning failed; account left bare");
                user
            }
        };

        info!(user_id = %user.id, email = %user.email, "user registered");
        self.session(user)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginRequest) -> AppResult<AuthResponse> {
        validate(&input)?;
        let Some(user) = User::find_by_email(&self.users, &input.email).await? else {
            warn!("login unknown email");
            return Err(invalid_credentials());
        };
        if !verify_password(&input.password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(invalid_credentials());
        }
        info!(user_id = %user.id, "user logged in");
        self.session(user)
    }

    pub async fn me(&self, user_id: Uuid) -> AppResult<PublicUser> {
        Ok(User::load(&self.users, user_id).await?.into())
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileRequest,
    ) -> AppResult<PublicUser> {
        validate(&input)?;
        User::load(&self.users, user_id).await?;
        if let Some(preset) = input.default_timer_preset {
            guard::ensure_references(
                self.users.store(),
                self.users.timeout(),
                user_id,
                &[Reference::new(RefKind::TimerPreset, preset)],
            )
            .await?;
        }
        let mut patch = patch_of(&input)?;
        if let Some(name) = &input.name {
            patch.insert("name".into(), Value::String(name.trim().to_string()));
        }
        let user = User::apply_patch(&self.users, user_id, patch).await?;
        info!(%user_id, "profile updated");
        Ok(user.into())
    }

    #[instrument(skip(self, input))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordRequest,
    ) -> AppResult<()> {
        validate(&input)?;
        let user = User::load(&self.users, user_id).await?;
        if !verify_password(&input.current_password, &user.password_hash)? {
            warn!(%user_id, "change password with wrong current password");
            return Err(AppError::bad_request("currentPassword: is incorrect"));
        }
        if input.current_password == input.new_password {
            return Err(AppError::bad_request(
                "newPassword: must differ from the current password",
            ));
        }
        let hash = hash_password(&input.new_password)?;
        User::apply_patch(&self.users, user_id, set("password", hash)).await?;
        info!(%user_id, "password changed");
        Ok(())
    }

    /// Succeeds whether or not the address belongs to an account.
    #[instrument(skip(self, input))]
    pub async fn forgot_password(&self, input: ForgotPasswordRequest) -> AppResult<()> {
        validate(&input)?;
        let Some(user) = User::find_by_email(&self.users, &input.email).await? else {
            info!("password reset requested for unknown email");
            return Ok(());
        };
        let token = match self.keys.sign_reset(user.id) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, user_id = %user.id, "jwt sign reset failed");
                return Ok(());
            }
        };
        let link = format!("{}/reset-password?token={token}", self.app_base_url);
        let rendered = templates::password_reset(user.preferred_language, &user.name, &link);
        self.send(&user.email, rendered);
        info!(user_id = %user.id, "password reset issued");
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn reset_password(&self, input: ResetPasswordRequest) -> AppResult<()> {
        validate(&input)?;
        let claims = self
            .keys
            .verify_purpose(&input.token, TokenPurpose::PasswordReset)
            .map_err(|e| {
                warn!(error = %e, "rejected reset token");
                invalid_token()
            })?;
        let Some(user) = self.users.get(claims.sub).await? else {
            warn!(user_id = %claims.sub, "reset token for missing user");
            return Err(invalid_token());
        };
        let hash = hash_password(&input.new_password)?;
        User::apply_patch(&self.users, user.id, set("password", hash)).await?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn request_verification(
        &self,
        user_id: Uuid,
        input: RequestVerificationRequest,
    ) -> AppResult<VerificationStatus> {
        validate(&input)?;
        let user = User::load(&self.users, user_id).await?;
        let now = OffsetDateTime::now_utc();
        if normalize_email(&input.email) != user.email {
            return Err(AppError::bad_request("email: does not match the account"));
        }
        if user.email_verified {
            return Err(AppError::bad_request("email already verified"));
        }
        if user
            .email_verification
            .as_ref()
            .is_some_and(|p| p.is_live(now))
        {
            return Err(AppError::bad_request("verification already requested"));
        }

        let token = self.keys.sign_verification(user.id, &user.email)?;
        let pending = PendingVerification {
            token: token.clone(),
            expires_at: now + self.keys.ttl(TokenPurpose::EmailVerification),
        };
        let pending = serde_json::to_value(&pending).map_err(anyhow::Error::from)?;
        let user =
            User::apply_patch(&self.users, user_id, set("emailVerification", pending)).await?;

        let link = format!("{}/verify-email?token={token}", self.app_base_url);
        let rendered = templates::email_verification(user.preferred_language, &user.name, &link);
        self.send(&user.email, rendered);
        info!(%user_id, "email verification requested");
        Ok(VerificationStatus::of(&user, now))
    }

    #[instrument(skip(self, input))]
    pub async fn verify_email(&self, input: VerifyEmailRequest) -> AppResult<VerificationStatus> {
        let claims = self
            .keys
            .verify_purpose(&input.token, TokenPurpose::EmailVerification)
            .map_err(|e| {
                warn!(error = %e, "rejected verification token");
                invalid_token()
            })?;
        let Some(user) = self.users.get(claims.sub).await? else {
            return Err(invalid_token());
        };
        if claims.email.as_deref() != Some(user.email.as_str()) {
            warn!(user_id = %user.id, "verification token for a previous email");
            return Err(invalid_token());
        }
        let now = OffsetDateTime::now_utc();
        if user.email_verified {
            return Ok(VerificationStatus::of(&user, now));
        }

        let mut patch = set("emailVerified", true);
        patch.insert("emailVerifiedAt".into(), timestamp_value(now)?);
        patch.insert("emailVerification".into(), Value::Null);
        let user = User::apply_patch(&self.users, user.id, patch).await?;
        info!(user_id = %user.id, "email verified");
        Ok(VerificationStatus::of(&user, now))
    }

    pub async fn verification_status(&self, user_id: Uuid) -> AppResult<VerificationStatus> {
        let user = User::load(&self.users, user_id).await?;
        Ok(VerificationStatus::of(&user, OffsetDateTime::now_utc()))
    }

    pub async fn ensure_defaults(&self, user_id: Uuid) -> AppResult<ProvisionReport> {
        self.provisioner.ensure_defaults(user_id).await
    }

    /// Fire and forget: a known address must not answer slower than an
    /// unknown one.
    fn send(&self, to: &str, rendered: templates::Rendered) {
        let outgoing = OutgoingMail {
            to: to.to_string(),
            subject: rendered.subject,
            html: rendered.html,
        };
        let _ = mail::dispatch(self.mailer.clone(), self.mail_timeout, outgoing);
    }
}
