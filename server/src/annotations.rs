use {
    crate::{
        collections,
        store::{Annotation, AnnotationAuthorship, Image, User},
        CreateError,
    },
    sqlx::{Connection, SqliteConnection},
};

/// Attach an annotation to `image`, recording `author` as its creator.
///
/// The body is produced by a client-side annotation tool and stays opaque to the server, but it must at least
/// parse as JSON before it is allowed into the store.  The annotation and its authorship are written in one
/// transaction.
pub async fn create(
    conn: &mut SqliteConnection,
    image: &Image,
    body: &str,
    author: &User,
) -> Result<(Annotation, AnnotationAuthorship), CreateError> {
    let mut errors = Vec::new();

    if body.is_empty() {
        errors.push("the annotation body is missing".to_string());
    } else if serde_json::from_str::<serde_json::Value>(body).is_err() {
        errors.push("the annotation body is not valid JSON".to_string());
    }

    if !errors.is_empty() {
        return Err(CreateError::Invalid(errors));
    }

    let mut tx = conn.begin().await?;

    let annotation_id = sqlx::query!(
        "INSERT INTO annotations (body, image_id) VALUES (?1, ?2)",
        body,
        image.image_id
    )
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let created_at = collections::timestamp();

    let authorship_id = sqlx::query!(
        "INSERT INTO annotation_authorships (annotation_id, user_id, created_at) \
         VALUES (?1, ?2, ?3)",
        annotation_id,
        author.user_id,
        created_at
    )
    .execute(&mut *tx)
    .await
    .map_err(|e| CreateError::Aborted {
        flow: "annotation creation",
        step: "recording authorship",
        message: e.to_string(),
    })?
    .last_insert_rowid();

    tx.commit().await?;

    Ok((
        Annotation {
            annotation_id,
            body: body.to_owned(),
            image_id: image.image_id,
        },
        AnnotationAuthorship {
            authorship_id,
            annotation_id,
            user_id: author.user_id,
            created_at,
        },
    ))
}
