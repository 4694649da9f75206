use std::path::Path;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use movienight_db::models::UserRow;
use movienight_types::api::{Account, AuthResponse, LoginRequest, SignupRequest};

use crate::error::{ApiError, AppJson};
use crate::session::create_token;
use crate::state::AppState;

/// 5 MB upload limit for avatars
pub const MAX_AVATAR_SIZE: usize = 5 * 1024 * 1024;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 32;

/// An avatar image attached to a signup form.
pub struct AvatarUpload {
    pub content_type: String,
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// Signup input: `multipart/form-data` with an optional `avatar` file, or plain JSON.
pub struct SignupForm {
    pub fields: SignupRequest,
    pub avatar: Option<AvatarUpload>,
}

impl FromRequest<AppState> for SignupForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let AppJson(fields) = AppJson::<SignupRequest>::from_request(req, state).await?;
            return Ok(SignupForm { fields, avatar: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;

        let mut fields = SignupRequest::default();
        let mut avatar = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "avatar" {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                if !bytes.is_empty() {
                    avatar = Some(AvatarUpload {
                        content_type,
                        file_name,
                        bytes,
                    });
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(e.body_text()))?;
            match name.as_str() {
                "username" => fields.username = Some(value),
                "email" => fields.email = Some(value),
                "password" => fields.password = Some(value),
                _ => {}
            }
        }

        Ok(SignupForm { fields, avatar })
    }
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    form: SignupForm,
) -> Result<impl IntoResponse, ApiError> {
    let SignupForm { fields, avatar } = form;

    let (Some(username), Some(email), Some(password)) = (
        non_blank(fields.username),
        non_blank(fields.email),
        fields.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::Validation("Missing fields".into()));
    };

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::Validation("Username too long".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if let Some(avatar) = &avatar {
        validate_avatar(avatar)?;
    }

    let (email_taken, username_taken) = {
        let (email, username) = (email.clone(), username.clone());
        state
            .run_db(move |db| {
                Ok((
                    db.get_user_by_email(&email)?.is_some(),
                    db.get_user_by_username(&username)?.is_some(),
                ))
            })
            .await?
    };
    if email_taken {
        return Err(ApiError::Duplicate("Email exists"));
    }
    if username_taken {
        return Err(ApiError::Duplicate("Username taken"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let avatar_url = match &avatar {
        Some(avatar) => Some(save_avatar(&state.upload_dir, avatar).await?),
        None => None,
    };

    let user_id = Uuid::new_v4();
    {
        let (username, email, avatar_url) = (username.clone(), email.clone(), avatar_url.clone());
        state
            .run_db(move |db| {
                db.create_user(
                    &user_id.to_string(),
                    &username,
                    &email,
                    &password_hash,
                    avatar_url.as_deref(),
                )
            })
            .await?;
    }

    let token = create_token(&state.jwt_secret, user_id, &username)?;
    info!("New account {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: Account {
                id: user_id,
                username,
                email,
                avatar_url,
            },
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (non_blank(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::Validation("Missing fields".into()));
    };

    let user: UserRow = state
        .run_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid credentials"))?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(AuthResponse {
        token,
        user: Account {
            id: user_id,
            username: user.username,
            email: user.email,
            avatar_url: user.avatar_url,
        },
    }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_avatar(avatar: &AvatarUpload) -> Result<(), ApiError> {
    if !avatar.content_type.starts_with("image/") {
        return Err(ApiError::Validation("Only images allowed".into()));
    }
    if avatar.bytes.len() > MAX_AVATAR_SIZE {
        return Err(ApiError::Validation("Avatar too large".into()));
    }
    Ok(())
}

/// Writes the avatar under `upload_dir` and returns its public URL.
async fn save_avatar(upload_dir: &Path, avatar: &AvatarUpload) -> Result<String, ApiError> {
    // Keep only a short alphanumeric extension from the client's file name
    let ext = avatar
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    let file_name = format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random_range(0..1_000_000_000u32),
        ext
    );

    tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", upload_dir.display(), e);
        anyhow::Error::from(e)
    })?;

    let path = upload_dir.join(&file_name);
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;
    file.write_all(&avatar.bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;
    file.flush().await.map_err(|e| {
        error!("Failed to flush file {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;

    Ok(format!("/uploads/{}", file_name))
}
