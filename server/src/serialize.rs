//! Read-side projection of the store into the nested JSON documents defined in [annopy_shared]
//!
//! Determinism matters here: the same store state must always produce the same document, byte for byte.  Every
//! child list is therefore fetched with an explicit ORDER BY on its insertion-ordered primary key, and all
//! structs serialize their fields in declaration order.

use {
    crate::store::{self, Annotation, Collection, Image},
    annopy_shared::{
        AnnotationAttributes, AnnotationData, CategoryAttributes, CategoryData, CollectionAttributes,
        CollectionData, CollectionsPage, EditionData, ImageAttributes, ImageData, Links, PageLinks,
        PersonAttributes, PersonData, Relationships, ResourceType,
    },
    anyhow::{anyhow, Result},
    sqlx::SqliteConnection,
};

/// How many collections a browse page holds
const PAGE_SIZE: u32 = 5;

async fn person(conn: &mut SqliteConnection, user_id: i64) -> Result<PersonData> {
    let user = store::user(conn, user_id)
        .await?
        .ok_or_else(|| anyhow!("authorship row references missing user {user_id}"))?;

    Ok(PersonData {
        kind: ResourceType::People,
        attributes: PersonAttributes {
            id: user.user_id,
            login: user.login,
            forename: user.forename,
            surname: user.surname,
        },
    })
}

async fn collection_editions(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Relationships> {
    let rows = sqlx::query!(
        "SELECT user_id, created_at FROM collection_authorships \
         WHERE collection_id = ?1 ORDER BY authorship_id",
        collection_id
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut editions = Vec::with_capacity(rows.len());
    for row in rows {
        editions.push(EditionData {
            author: person(&mut *conn, row.user_id).await?,
            on: row.created_at,
        });
    }

    Ok(Relationships { editions })
}

async fn annotation_editions(
    conn: &mut SqliteConnection,
    annotation_id: i64,
) -> Result<Relationships> {
    let rows = sqlx::query!(
        "SELECT user_id, created_at FROM annotation_authorships \
         WHERE annotation_id = ?1 ORDER BY authorship_id",
        annotation_id
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut editions = Vec::with_capacity(rows.len());
    for row in rows {
        editions.push(EditionData {
            author: person(&mut *conn, row.user_id).await?,
            on: row.created_at,
        });
    }

    Ok(Relationships { editions })
}

async fn annotation_data(
    conn: &mut SqliteConnection,
    annotation: &Annotation,
) -> Result<AnnotationData> {
    Ok(AnnotationData {
        kind: ResourceType::Annotation,
        attributes: AnnotationAttributes {
            id: annotation.annotation_id,
            annotation_json: serde_json::from_str(&annotation.body)?,
            relationships: annotation_editions(conn, annotation.annotation_id).await?,
        },
    })
}

async fn image_data(conn: &mut SqliteConnection, image: &Image) -> Result<ImageData> {
    let rows = sqlx::query!(
        "SELECT annotation_id, body, image_id FROM annotations \
         WHERE image_id = ?1 ORDER BY annotation_id",
        image.image_id
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut annotations = Vec::with_capacity(rows.len());
    for row in rows {
        annotations.push(
            annotation_data(
                &mut *conn,
                &Annotation {
                    annotation_id: row.annotation_id,
                    body: row.body,
                    image_id: row.image_id,
                },
            )
            .await?,
        );
    }

    Ok(ImageData {
        kind: ResourceType::Image,
        attributes: ImageAttributes {
            id: image.image_id,
            url: image.url.clone(),
            annotations,
        },
    })
}

/// Serialize a single image, or `None` if no such image exists.
pub async fn image(conn: &mut SqliteConnection, image_id: i64) -> Result<Option<ImageData>> {
    Ok(match store::image(&mut *conn, image_id).await? {
        Some(image) => Some(image_data(conn, &image).await?),
        None => None,
    })
}

async fn categories_of(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Vec<CategoryData>> {
    let rows = sqlx::query!(
        "SELECT category_id FROM collection_categories \
         WHERE collection_id = ?1 ORDER BY link_id",
        collection_id
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut categories = Vec::with_capacity(rows.len());
    for row in rows {
        let category = store::category(&mut *conn, row.category_id)
            .await?
            .ok_or_else(|| anyhow!("category link references missing category {}", row.category_id))?;

        categories.push(CategoryData {
            kind: ResourceType::Category,
            attributes: CategoryAttributes {
                id: category.category_id,
                name: category.name,
            },
        });
    }

    Ok(categories)
}

async fn collection_data(
    conn: &mut SqliteConnection,
    collection: &Collection,
) -> Result<CollectionData> {
    let image_rows = sqlx::query!(
        "SELECT image_id FROM collection_images WHERE collection_id = ?1 ORDER BY link_id",
        collection.collection_id
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut images = Vec::with_capacity(image_rows.len());
    for row in image_rows {
        let image = store::image(&mut *conn, row.image_id)
            .await?
            .ok_or_else(|| anyhow!("image link references missing image {}", row.image_id))?;

        images.push(image_data(&mut *conn, &image).await?);
    }

    Ok(CollectionData {
        kind: ResourceType::Collection,
        id: collection.collection_id,
        attributes: CollectionAttributes {
            name: collection.name.clone(),
            categories: categories_of(&mut *conn, collection.collection_id).await?,
            description: collection.description.clone(),
        },
        relationships: collection_editions(&mut *conn, collection.collection_id).await?,
        images,
        links: Links {
            page: format!("/collection/{}", collection.collection_id),
            json: format!("/api/collection/{}", collection.collection_id),
        },
    })
}

/// Serialize a collection and everything it transitively owns, or `None` if no such collection exists.
pub async fn collection(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Option<CollectionData>> {
    Ok(match store::collection(&mut *conn, collection_id).await? {
        Some(collection) => Some(collection_data(conn, &collection).await?),
        None => None,
    })
}

fn page_link(keyword: Option<&str>, page: u32) -> String {
    match keyword {
        Some(keyword) => format!("/api/collections?q={keyword}&page={page}"),
        None => format!("/api/collections?page={page}"),
    }
}

/// Serialize one browse page of collections, optionally filtered by a name keyword.
///
/// Pages are 1-based and hold [PAGE_SIZE] collections each.  A page past the end of the results is `None`,
/// except that page 1 of an empty result set is an empty page rather than a missing one.
pub async fn collections(
    conn: &mut SqliteConnection,
    keyword: Option<&str>,
    page: u32,
) -> Result<Option<CollectionsPage>> {
    let page = page.max(1);

    // Fetch one row beyond the page so we know whether a next page exists.  The offset is computed in i64 so
    // that the largest parseable page numbers cannot overflow.
    let limit = i64::from(PAGE_SIZE) + 1;
    let offset = (i64::from(page) - 1) * i64::from(PAGE_SIZE);

    let mut rows = if let Some(keyword) = keyword {
        sqlx::query!(
            "SELECT collection_id, name, description FROM collections \
             WHERE name LIKE '%' || ?1 || '%' ORDER BY collection_id LIMIT ?2 OFFSET ?3",
            keyword,
            limit,
            offset
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| Collection {
            collection_id: row.collection_id,
            name: row.name,
            description: row.description,
        })
        .collect::<Vec<_>>()
    } else {
        sqlx::query!(
            "SELECT collection_id, name, description FROM collections \
             ORDER BY collection_id LIMIT ?1 OFFSET ?2",
            limit,
            offset
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| Collection {
            collection_id: row.collection_id,
            name: row.name,
            description: row.description,
        })
        .collect::<Vec<_>>()
    };

    if rows.is_empty() && page > 1 {
        return Ok(None);
    }

    let has_next = rows.len() > PAGE_SIZE as usize;
    rows.truncate(PAGE_SIZE as usize);

    let mut data = Vec::with_capacity(rows.len());
    for row in &rows {
        data.push(collection_data(&mut *conn, row).await?);
    }

    Ok(Some(CollectionsPage {
        links: PageLinks {
            page: page_link(keyword, page),
            next: has_next.then(|| page_link(keyword, page + 1)),
            prev: (page > 1).then(|| page_link(keyword, page - 1)),
        },
        data,
    }))
}
