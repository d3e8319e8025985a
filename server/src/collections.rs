//! Collection creation, composition, and deletion
//!
//! [create_with_images] is the whole "create a collection" flow: validate and create the collection, record its
//! authorship, file it under a category, then add one image row and one link row per supplied URL.  The flow
//! runs inside a single transaction, so a failure at any step leaves no rows behind.

use {
    crate::{
        store,
        store::{
            Category, Collection, CollectionAuthorship, CollectionCategory, CollectionImage,
            Image, User,
        },
        CreateError,
    },
    anyhow::Result,
    chrono::{SecondsFormat, Utc},
    sqlx::{Connection, SqliteConnection},
};

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Create a collection.
///
/// Name and description are both required and every problem is reported at once; the name may not
/// substring-match an existing collection's name.
pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    description: &str,
) -> Result<Collection, CreateError> {
    let mut errors = Vec::new();

    if name.is_empty() {
        errors.push("the collection name is missing".to_string());
    } else if store::collection_name_like(&mut *conn, name).await?.is_some() {
        errors.push(format!("a collection named \"{name}\" already exists"));
    }

    if description.is_empty() {
        errors.push("the collection description is missing".to_string());
    }

    if !errors.is_empty() {
        return Err(CreateError::Invalid(errors));
    }

    let collection_id = sqlx::query!(
        "INSERT INTO collections (name, description) VALUES (?1, ?2)",
        name,
        description
    )
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Collection {
        collection_id,
        name: name.to_owned(),
        description: description.to_owned(),
    })
}

/// Record that `user` created `collection`, stamped with the current time.
pub async fn link_author(
    conn: &mut SqliteConnection,
    collection: &Collection,
    user: &User,
) -> Result<CollectionAuthorship> {
    let created_at = timestamp();

    let authorship_id = sqlx::query!(
        "INSERT INTO collection_authorships (collection_id, user_id, created_at) \
         VALUES (?1, ?2, ?3)",
        collection.collection_id,
        user.user_id,
        created_at
    )
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(CollectionAuthorship {
        authorship_id,
        collection_id: collection.collection_id,
        user_id: user.user_id,
        created_at,
    })
}

/// File `collection` under `category`.
pub async fn link_category(
    conn: &mut SqliteConnection,
    collection: &Collection,
    category: &Category,
) -> Result<CollectionCategory> {
    let link_id = sqlx::query!(
        "INSERT INTO collection_categories (collection_id, category_id) VALUES (?1, ?2)",
        collection.collection_id,
        category.category_id
    )
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(CollectionCategory {
        link_id,
        collection_id: collection.collection_id,
        category_id: category.category_id,
    })
}

/// Create an image row and link it into `collection`.
///
/// The image becomes a child of the link: it lives exactly as long as its membership in this collection.
pub async fn add_image(
    conn: &mut SqliteConnection,
    collection: &Collection,
    url: &str,
) -> Result<(Image, CollectionImage), CreateError> {
    if url.is_empty() {
        return Err(CreateError::Invalid(vec![
            "the image URL is missing".to_string(),
        ]));
    }

    let image_id = sqlx::query!("INSERT INTO images (url) VALUES (?1)", url)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    let link_id = sqlx::query!(
        "INSERT INTO collection_images (collection_id, image_id) VALUES (?1, ?2)",
        collection.collection_id,
        image_id
    )
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok((
        Image {
            image_id,
            url: url.to_owned(),
        },
        CollectionImage {
            link_id,
            collection_id: collection.collection_id,
            image_id,
        },
    ))
}

/// The full collection-creation flow, as a single all-or-nothing operation.
///
/// The category is resolved by substring match against existing category names, the way the creation form
/// refers to it.  All writes happen inside one transaction; if any step fails the transaction is rolled back
/// and the failure is reported as [CreateError::Aborted].
pub async fn create_with_images(
    conn: &mut SqliteConnection,
    name: &str,
    description: &str,
    category_name: &str,
    image_urls: &[String],
    author: &User,
) -> Result<Collection, CreateError> {
    let Some(category) = store::category_like(&mut *conn, category_name).await? else {
        return Err(CreateError::Invalid(vec![format!(
            "no category matches \"{category_name}\""
        )]));
    };

    let mut tx = conn.begin().await?;

    let collection = create(&mut *tx, name, description).await?;

    link_author(&mut *tx, &collection, author)
        .await
        .map_err(|e| CreateError::Aborted {
            flow: "collection creation",
            step: "recording authorship",
            message: e.to_string(),
        })?;

    link_category(&mut *tx, &collection, &category)
        .await
        .map_err(|e| CreateError::Aborted {
            flow: "collection creation",
            step: "linking the category",
            message: e.to_string(),
        })?;

    for url in image_urls {
        add_image(&mut *tx, &collection, url)
            .await
            .map_err(|e| CreateError::Aborted {
                flow: "collection creation",
                step: "adding images",
                message: e.to_string(),
            })?;
    }

    tx.commit().await?;

    Ok(collection)
}

/// Update a collection's fields in place.  Only the provided fields are overwritten; the last write wins.
pub async fn update(
    conn: &mut SqliteConnection,
    collection_id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Collection>> {
    let Some(collection) = store::collection(&mut *conn, collection_id).await? else {
        return Ok(None);
    };

    let name = name.filter(|s| !s.is_empty()).unwrap_or(&collection.name);

    let description = description
        .filter(|s| !s.is_empty())
        .unwrap_or(&collection.description);

    sqlx::query!(
        "UPDATE collections SET name = ?1, description = ?2 WHERE collection_id = ?3",
        name,
        description,
        collection_id
    )
    .execute(conn)
    .await?;

    Ok(Some(Collection {
        collection_id,
        name: name.to_owned(),
        description: description.to_owned(),
    }))
}

/// Delete a collection and everything it owns: its authorship, category, and image links, its images, and
/// transitively those images' annotations and their authorships.  Users and categories survive.
///
/// Returns the deleted collection, or `None` if no collection has this identifier.
pub async fn delete(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Option<Collection>> {
    let Some(collection) = store::collection(&mut *conn, collection_id).await? else {
        return Ok(None);
    };

    let mut tx = conn.begin().await?;

    // Images are children of their membership link, so they go explicitly; their annotations, the annotation
    // authorships, and the link rows themselves follow via the schema's cascades, as do the collection's own
    // association rows once the collection goes.
    sqlx::query!(
        "DELETE FROM images WHERE image_id IN \
         (SELECT image_id FROM collection_images WHERE collection_id = ?1)",
        collection_id
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        "DELETE FROM collections WHERE collection_id = ?1",
        collection_id
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(collection))
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{annotations, categories, test_util::connect, users},
    };

    async fn fixtures(conn: &mut SqliteConnection) -> Result<(User, Category)> {
        let user = users::create(
            conn,
            "Alice",
            "Carroll",
            "alice",
            "alice@example.com",
            "looking-glass",
        )
        .await?;

        let category = categories::create(conn, "Natural history").await?;

        Ok((user, category))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn missing_fields_are_all_reported() -> Result<()> {
        let mut conn = connect().await?;

        let Err(CreateError::Invalid(errors)) = create(&mut conn, "", "").await else {
            panic!("expected a validation failure");
        };

        assert_eq!(
            errors,
            vec![
                "the collection name is missing".to_string(),
                "the collection description is missing".to_string()
            ]
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn duplicate_names_are_rejected() -> Result<()> {
        let mut conn = connect().await?;

        create(&mut conn, "Birds", "A collection of birds").await?;

        let Err(CreateError::Invalid(errors)) =
            create(&mut conn, "Birds", "Another description").await
        else {
            panic!("expected a validation failure");
        };

        assert_eq!(errors, vec!["a collection named \"Birds\" already exists".to_string()]);

        // Still exactly one collection named "Birds".

        assert_eq!(
            sqlx::query!("SELECT collection_id FROM collections WHERE name = 'Birds'")
                .fetch_all(&mut conn)
                .await?
                .len(),
            1
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn authorship_links_collection_and_user() -> Result<()> {
        let mut conn = connect().await?;

        let (user, _) = fixtures(&mut conn).await?;

        let collection = create(&mut conn, "Birds", "A collection of birds").await?;

        assert_eq!(collection.collection_id, 1);

        let authorship = link_author(&mut conn, &collection, &user).await?;

        assert_eq!(authorship.collection_id, 1);
        assert_eq!(authorship.user_id, user.user_id);

        let rows = sqlx::query!(
            "SELECT collection_id, user_id FROM collection_authorships"
        )
        .fetch_all(&mut conn)
        .await?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].collection_id, 1);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn the_creation_flow_writes_every_row() -> Result<()> {
        let mut conn = connect().await?;

        let (user, _) = fixtures(&mut conn).await?;

        let urls = vec![
            "https://example.com/1.jpg".to_string(),
            "https://example.com/2.jpg".to_string(),
        ];

        let collection = create_with_images(
            &mut conn,
            "Birds",
            "A collection of birds",
            "Natural",
            &urls,
            &user,
        )
        .await?;

        assert_eq!(
            sqlx::query!("SELECT authorship_id FROM collection_authorships WHERE collection_id = ?1", collection.collection_id)
                .fetch_all(&mut conn)
                .await?
                .len(),
            1
        );

        assert_eq!(
            sqlx::query!("SELECT link_id FROM collection_categories WHERE collection_id = ?1", collection.collection_id)
                .fetch_all(&mut conn)
                .await?
                .len(),
            1
        );

        let images = sqlx::query!("SELECT url FROM images ORDER BY image_id")
            .fetch_all(&mut conn)
            .await?;

        assert_eq!(
            images.into_iter().map(|row| row.url).collect::<Vec<_>>(),
            urls
        );

        assert_eq!(
            sqlx::query!("SELECT link_id FROM collection_images WHERE collection_id = ?1", collection.collection_id)
                .fetch_all(&mut conn)
                .await?
                .len(),
            2
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn a_failed_flow_leaves_nothing_behind() -> Result<()> {
        let mut conn = connect().await?;

        let (user, _) = fixtures(&mut conn).await?;

        // The middle URL is invalid, so the whole flow must roll back.

        let urls = vec![
            "https://example.com/1.jpg".to_string(),
            String::new(),
            "https://example.com/3.jpg".to_string(),
        ];

        let Err(CreateError::Aborted { step, .. }) = create_with_images(
            &mut conn,
            "Birds",
            "A collection of birds",
            "Natural",
            &urls,
            &user,
        )
        .await
        else {
            panic!("expected the flow to abort");
        };

        assert_eq!(step, "adding images");

        assert!(sqlx::query!("SELECT collection_id FROM collections")
            .fetch_optional(&mut conn)
            .await?
            .is_none());
        assert!(sqlx::query!("SELECT image_id FROM images")
            .fetch_optional(&mut conn)
            .await?
            .is_none());
        assert!(sqlx::query!("SELECT authorship_id FROM collection_authorships")
            .fetch_optional(&mut conn)
            .await?
            .is_none());
        assert!(sqlx::query!("SELECT link_id FROM collection_categories")
            .fetch_optional(&mut conn)
            .await?
            .is_none());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn the_flow_requires_an_existing_category() -> Result<()> {
        let mut conn = connect().await?;

        let (user, _) = fixtures(&mut conn).await?;

        let Err(CreateError::Invalid(errors)) = create_with_images(
            &mut conn,
            "Birds",
            "A collection of birds",
            "Astronomy",
            &[],
            &user,
        )
        .await
        else {
            panic!("expected a validation failure");
        };

        assert!(errors[0].contains("no category matches"));

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn deleting_a_collection_cascades_to_everything_it_owns() -> Result<()> {
        let mut conn = connect().await?;

        let (user, _) = fixtures(&mut conn).await?;

        let urls = vec!["https://example.com/1.jpg".to_string()];

        let collection = create_with_images(
            &mut conn,
            "Birds",
            "A collection of birds",
            "Natural",
            &urls,
            &user,
        )
        .await?;

        let image = store::image(&mut conn, 1).await?.unwrap();

        annotations::create(&mut conn, &image, r#"{"note": "a heron"}"#, &user).await?;

        assert!(delete(&mut conn, collection.collection_id).await?.is_some());

        for (table, select) in [
            ("collections", "SELECT count(*) AS n FROM collections"),
            ("images", "SELECT count(*) AS n FROM images"),
            ("annotations", "SELECT count(*) AS n FROM annotations"),
            (
                "collection_authorships",
                "SELECT count(*) AS n FROM collection_authorships",
            ),
            (
                "annotation_authorships",
                "SELECT count(*) AS n FROM annotation_authorships",
            ),
            (
                "collection_categories",
                "SELECT count(*) AS n FROM collection_categories",
            ),
            (
                "collection_images",
                "SELECT count(*) AS n FROM collection_images",
            ),
        ] {
            let count = sqlx::query(select)
                .fetch_one(&mut conn)
                .await
                .map(|row| sqlx::Row::get::<i64, _>(&row, 0))?;

            assert_eq!(count, 0, "expected {table} to be empty");
        }

        // The user and the category are independent entities and survive.

        assert!(store::user_by_login(&mut conn, "alice").await?.is_some());
        assert!(store::category_like(&mut conn, "Natural").await?.is_some());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn deleting_a_missing_collection_reports_not_found() -> Result<()> {
        let mut conn = connect().await?;

        assert!(delete(&mut conn, 9999).await?.is_none());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn updates_overwrite_only_the_provided_fields() -> Result<()> {
        let mut conn = connect().await?;

        let collection = create(&mut conn, "Birds", "A collection of birds").await?;

        let updated = update(
            &mut conn,
            collection.collection_id,
            None,
            Some("Mostly herons"),
        )
        .await?
        .unwrap();

        assert_eq!(updated.name, "Birds");
        assert_eq!(updated.description, "Mostly herons");

        assert_eq!(
            store::collection(&mut conn, collection.collection_id)
                .await?
                .unwrap()
                .description,
            "Mostly herons"
        );

        assert!(update(&mut conn, 9999, Some("X"), None).await?.is_none());

        Ok(())
    }
}
