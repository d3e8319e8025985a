//! Entity records and by-identifier lookups
//!
//! Every entity is created through the factory functions in the [users](crate::users),
//! [categories](crate::categories), [collections](crate::collections), and [annotations](crate::annotations)
//! modules; the structs here mirror what those factories persist, identifiers included.

use sqlx::SqliteConnection;

/// A registered user
///
/// The password is stored only as a salted one-way hash -- see [hash_password](crate::auth::hash_password).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    pub user_id: i64,
    pub forename: String,
    pub surname: String,
    pub login: String,
    pub email: String,
    pub password_hash: String,
}

/// A category collections can be filed under
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
}

/// A named, described grouping of images
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Collection {
    pub collection_id: i64,
    pub name: String,
    pub description: String,
}

/// An image, identified only by its URL
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    pub image_id: i64,
    pub url: String,
}

/// An annotation attached to an image
///
/// The body is an opaque JSON text blob produced by a client-side annotation tool; beyond checking that it
/// parses, the server never interprets it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotation {
    pub annotation_id: i64,
    pub body: String,
    pub image_id: i64,
}

/// Records which user created a collection, and when
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionAuthorship {
    pub authorship_id: i64,
    pub collection_id: i64,
    pub user_id: i64,
    pub created_at: String,
}

/// Records which user wrote an annotation, and when
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnotationAuthorship {
    pub authorship_id: i64,
    pub annotation_id: i64,
    pub user_id: i64,
    pub created_at: String,
}

/// Links a collection to the category it is filed under
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionCategory {
    pub link_id: i64,
    pub collection_id: i64,
    pub category_id: i64,
}

/// Links a collection to one of its images
///
/// The image is a child of this link: deleting the link (or its collection) deletes the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionImage {
    pub link_id: i64,
    pub collection_id: i64,
    pub image_id: i64,
}

pub async fn user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<User>, sqlx::Error> {
    Ok(sqlx::query!(
        "SELECT user_id, forename, surname, login, email, password_hash \
         FROM users WHERE user_id = ?1",
        user_id
    )
    .fetch_optional(conn)
    .await?
    .map(|row| User {
        user_id: row.user_id,
        forename: row.forename,
        surname: row.surname,
        login: row.login,
        email: row.email,
        password_hash: row.password_hash,
    }))
}

pub async fn user_by_login(
    conn: &mut SqliteConnection,
    login: &str,
) -> Result<Option<User>, sqlx::Error> {
    Ok(sqlx::query!(
        "SELECT user_id, forename, surname, login, email, password_hash \
         FROM users WHERE login = ?1",
        login
    )
    .fetch_optional(conn)
    .await?
    .map(|row| User {
        user_id: row.user_id,
        forename: row.forename,
        surname: row.surname,
        login: row.login,
        email: row.email,
        password_hash: row.password_hash,
    }))
}

pub async fn collection(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Option<Collection>, sqlx::Error> {
    Ok(sqlx::query!(
        "SELECT collection_id, name, description FROM collections WHERE collection_id = ?1",
        collection_id
    )
    .fetch_optional(conn)
    .await?
    .map(|row| Collection {
        collection_id: row.collection_id,
        name: row.name,
        description: row.description,
    }))
}

pub async fn category(
    conn: &mut SqliteConnection,
    category_id: i64,
) -> Result<Option<Category>, sqlx::Error> {
    Ok(
        sqlx::query!(
            "SELECT category_id, name FROM categories WHERE category_id = ?1",
            category_id
        )
        .fetch_optional(conn)
        .await?
        .map(|row| Category {
            category_id: row.category_id,
            name: row.name,
        }),
    )
}

/// Resolve a category by substring match against its name, the way users refer to categories when creating
/// collections.
pub async fn category_like(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Category>, sqlx::Error> {
    Ok(sqlx::query!(
        "SELECT category_id, name FROM categories \
         WHERE name LIKE '%' || ?1 || '%' ORDER BY category_id LIMIT 1",
        name
    )
    .fetch_optional(conn)
    .await?
    .map(|row| Category {
        category_id: row.category_id,
        name: row.name,
    }))
}

pub async fn image(
    conn: &mut SqliteConnection,
    image_id: i64,
) -> Result<Option<Image>, sqlx::Error> {
    Ok(
        sqlx::query!("SELECT image_id, url FROM images WHERE image_id = ?1", image_id)
            .fetch_optional(conn)
            .await?
            .map(|row| Image {
                image_id: row.image_id,
                url: row.url,
            }),
    )
}

/// Shared name registry consulted by both the collection and category validators.
///
/// Collection and category names share one namespace, matched by substring; returns the name of the first
/// colliding collection, if any.
pub async fn collection_name_like(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<String>, sqlx::Error> {
    Ok(sqlx::query!(
        "SELECT name FROM collections WHERE name LIKE '%' || ?1 || '%' ORDER BY collection_id LIMIT 1",
        name
    )
    .fetch_optional(conn)
    .await?
    .map(|row| row.name))
}
