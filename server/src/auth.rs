use {
    crate::{users, warp_util::HttpError},
    annopy_shared::{Authorization, TokenError, TokenErrorType, TokenRequest, TokenSuccess, TokenType},
    anyhow::Result,
    http::{header, status::StatusCode, Response},
    hyper::Body,
    jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation},
    sqlx::SqliteConnection,
    std::{
        num::NonZeroU32,
        ops::DerefMut,
        sync::Arc,
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
    tokio::{sync::Mutex as AsyncMutex, time},
    tracing::warn,
};

const TOKEN_EXPIRATION_SECS: u64 = 24 * 60 * 60;

/// Hash a password using PBKDF2-HMAC-SHA256, returning the base64-encoded digest.
///
/// The user's login is used as the salt, so the same password hashes differently for different users.  The hash
/// is one-way; passwords are checked by recomputing and comparing (see [verify_password]).
pub fn hash_password(salt: &[u8], secret: &[u8]) -> String {
    let iterations = NonZeroU32::new(100_000).unwrap();
    const SIZE: usize = ring::digest::SHA256_OUTPUT_LEN;
    let mut hash: [u8; SIZE] = [0u8; SIZE];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret,
        &mut hash,
    );
    base64::encode(&hash)
}

/// Recompute the hash of `password` for this user and compare it with the stored one.
pub fn verify_password(user: &crate::store::User, password: &str) -> bool {
    hash_password(user.login.as_bytes(), password.as_bytes()) == user.password_hash
}

/// Handle a POST /token request: check the supplied credentials and mint an HS256 JWT whose subject is the
/// user's login.
///
/// Responses to invalid credentials are delayed (behind `mutex`, so the delays queue up) to slow down
/// brute-force attempts.
pub async fn authenticate(
    conn: &AsyncMutex<SqliteConnection>,
    request: &TokenRequest,
    key: &[u8],
    mutex: &AsyncMutex<()>,
    invalid_credential_delay: Duration,
) -> Result<Response<Body>> {
    let _lock = mutex.lock().await;

    let user = users::authenticate(
        conn.lock().await.deref_mut(),
        &request.username,
        &request.password,
    )
    .await?;

    Ok(if let Some(user) = user {
        let expiration = (SystemTime::now() + Duration::from_secs(TOKEN_EXPIRATION_SECS))
            .duration_since(UNIX_EPOCH)?
            .as_secs();

        let success = TokenSuccess {
            access_token: jsonwebtoken::encode(
                &Header::new(Algorithm::HS256),
                &Authorization {
                    expiration: Some(expiration),
                    subject: Some(user.login),
                },
                &EncodingKey::from_secret(key),
            )?,
            token_type: TokenType::Jwt,
        };

        let json = serde_json::to_vec(&success)?;

        crate::response()
            .header(header::CONTENT_LENGTH, json.len())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json))?
    } else {
        warn!("received invalid credentials; delaying response");

        time::sleep(invalid_credential_delay).await;

        let error = serde_json::to_vec(&TokenError {
            error: TokenErrorType::UnauthorizedClient,
            error_description: None,
        })?;

        crate::response()
            .status(StatusCode::UNAUTHORIZED)
            .header(header::CONTENT_LENGTH, error.len())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(error))?
    })
}

/// Decode and validate a bearer token, returning the claims it carries.
pub fn authorize(token: &str, key: &[u8]) -> Result<Arc<Authorization>, HttpError> {
    Ok(Arc::new(
        jsonwebtoken::decode::<Authorization>(
            token,
            &DecodingKey::from_secret(key),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            warn!("received invalid token: {}: {:?}", token, e);

            HttpError::from_slice(StatusCode::UNAUTHORIZED, "invalid token")
        })?
        .claims,
    ))
}
