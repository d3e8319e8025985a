use {
    crate::{auth, store, store::User, CreateError},
    anyhow::Result,
    sqlx::SqliteConnection,
};

/// Create a user account.
///
/// All five fields are required and the password must be at least six characters; problems are accumulated so
/// the caller learns about every one of them at once.  The password is stored only as a salted hash.
pub async fn create(
    conn: &mut SqliteConnection,
    forename: &str,
    surname: &str,
    login: &str,
    email: &str,
    password: &str,
) -> Result<User, CreateError> {
    let mut errors = Vec::new();

    if forename.is_empty() {
        errors.push("the forename is missing".to_string());
    }
    if surname.is_empty() {
        errors.push("the surname is missing".to_string());
    }
    if login.is_empty() {
        errors.push("the login is missing".to_string());
    }
    if email.is_empty() {
        errors.push("the email is missing".to_string());
    }
    if password.len() < 6 {
        errors.push("the password is empty or shorter than 6 characters".to_string());
    }

    if sqlx::query!(
        "SELECT user_id FROM users WHERE login = ?1 OR email = ?2 LIMIT 1",
        login,
        email
    )
    .fetch_optional(&mut *conn)
    .await?
    .is_some()
    {
        errors.push("this login or email is already registered".to_string());
    }

    if !errors.is_empty() {
        return Err(CreateError::Invalid(errors));
    }

    let password_hash = auth::hash_password(login.as_bytes(), password.as_bytes());

    let user_id = sqlx::query!(
        "INSERT INTO users (forename, surname, login, email, password_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        forename,
        surname,
        login,
        email,
        password_hash
    )
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(User {
        user_id,
        forename: forename.to_owned(),
        surname: surname.to_owned(),
        login: login.to_owned(),
        email: email.to_owned(),
        password_hash,
    })
}

/// Check a login/password pair, returning the user on success and `None` on any mismatch.
pub async fn authenticate(
    conn: &mut SqliteConnection,
    login: &str,
    password: &str,
) -> Result<Option<User>> {
    Ok(store::user_by_login(conn, login)
        .await?
        .filter(|user| auth::verify_password(user, password)))
}

/// Change a user's password.
///
/// The current password must verify and the confirmation must match the new password; as with [create], every
/// missing field is reported, not just the first.
pub async fn update_password(
    conn: &mut SqliteConnection,
    login: &str,
    current_password: &str,
    new_password: &str,
    confirm_password: &str,
) -> Result<User, CreateError> {
    let mut errors = Vec::new();

    if current_password.is_empty() {
        errors.push("the current password is missing".to_string());
    }
    if new_password.is_empty() {
        errors.push("the new password is missing".to_string());
    }
    if confirm_password.is_empty() {
        errors.push("the new password confirmation is missing".to_string());
    }

    if !errors.is_empty() {
        return Err(CreateError::Invalid(errors));
    }

    let Some(user) = store::user_by_login(&mut *conn, login).await? else {
        return Err(CreateError::Invalid(vec![format!(
            "no user has the login \"{login}\""
        )]));
    };

    if !auth::verify_password(&user, current_password) {
        return Err(CreateError::Invalid(vec![
            "the current password is incorrect".to_string(),
        ]));
    }

    if new_password != confirm_password {
        return Err(CreateError::Invalid(vec![
            "the new password confirmation does not match".to_string(),
        ]));
    }

    let password_hash = auth::hash_password(login.as_bytes(), new_password.as_bytes());

    sqlx::query!(
        "UPDATE users SET password_hash = ?1 WHERE user_id = ?2",
        password_hash,
        user.user_id
    )
    .execute(conn)
    .await?;

    Ok(User {
        password_hash,
        ..user
    })
}

/// Update a user's own profile fields in place.  Only the provided fields are overwritten; the last write wins.
pub async fn update_profile(
    conn: &mut SqliteConnection,
    login: &str,
    forename: Option<&str>,
    surname: Option<&str>,
) -> Result<Option<User>> {
    let Some(user) = store::user_by_login(&mut *conn, login).await? else {
        return Ok(None);
    };

    let forename = forename.filter(|s| !s.is_empty()).unwrap_or(&user.forename);
    let surname = surname.filter(|s| !s.is_empty()).unwrap_or(&user.surname);

    sqlx::query!(
        "UPDATE users SET forename = ?1, surname = ?2 WHERE user_id = ?3",
        forename,
        surname,
        user.user_id
    )
    .execute(conn)
    .await?;

    Ok(Some(User {
        forename: forename.to_owned(),
        surname: surname.to_owned(),
        ..user
    }))
}
