use {
    crate::{store, store::Category, CreateError},
    sqlx::SqliteConnection,
};

/// Create a category.
///
/// Category names share a namespace with collection names: a name that substring-matches an existing
/// collection's name is rejected.  The lookup lives in [store::collection_name_like] so the rule is defined in
/// one place; see DESIGN.md for its status.
pub async fn create(conn: &mut SqliteConnection, name: &str) -> Result<Category, CreateError> {
    let mut errors = Vec::new();

    if name.is_empty() {
        errors.push("the category name is missing".to_string());
    } else if store::collection_name_like(&mut *conn, name).await?.is_some() {
        errors.push(format!("a collection named \"{name}\" already exists"));
    }

    if !errors.is_empty() {
        return Err(CreateError::Invalid(errors));
    }

    let category_id = sqlx::query!("INSERT INTO categories (name) VALUES (?1)", name)
        .execute(conn)
        .await?
        .last_insert_rowid();

    Ok(Category {
        category_id,
        name: name.to_owned(),
    })
}
