//! Annopy server
//!
//! This crate implements the backend of a collaborative image annotation webapp.  Registered users group images
//! into categorized collections and attach JSON annotations to them; the server records who created what and
//! when, and serves everything back as nested JSON documents.
//!
//! The state lives in a SQLite database.  The [users], [categories], [collections], and [annotations] modules
//! validate and create entities; [serialize] projects them into the wire types defined in [annopy_shared]; and
//! [routes] exposes the whole thing over HTTP with JWT bearer authentication.

#![deny(warnings)]

use {
    annopy_shared::{
        ApiErrors, Authorization, CollectionsQuery, CreateCollectionRequest, TokenRequest,
    },
    anyhow::{anyhow, Result},
    futures::future::{self, FutureExt, TryFutureExt},
    http::{
        header,
        response::{self, Response},
        status::StatusCode,
    },
    hyper::Body,
    rand::Rng,
    sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqliteConnection},
    std::{
        convert::Infallible,
        net::SocketAddrV4,
        ops::DerefMut,
        panic::{self, AssertUnwindSafe},
        sync::Arc,
        time::Duration,
    },
    structopt::StructOpt,
    tokio::sync::Mutex as AsyncMutex,
    tracing::{info, warn},
    warp::{Filter, Rejection, Reply},
    warp_util::{Bearer, HttpError},
};

pub mod annotations;
pub mod categories;
pub mod collections;
pub mod serialize;
pub mod store;
pub mod users;

mod auth;
mod warp_util;

const INVALID_CREDENTIAL_DELAY_SECS: u64 = 5;

/// Why an entity could not be created
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// The request failed validation; one entry per problem found
    #[error("{}", .0.join(", "))]
    Invalid(Vec<String>),

    /// A multi-step flow failed partway through and was rolled back, leaving the store untouched
    #[error("{flow} aborted while {step}: {message}")]
    Aborted {
        flow: &'static str,
        step: &'static str,
        message: String,
    },
}

impl CreateError {
    /// The error list to send back to an API client.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Invalid(errors) => errors.clone(),
            Self::Aborted { .. } => vec![self.to_string()],
        }
    }
}

impl From<sqlx::Error> for CreateError {
    fn from(error: sqlx::Error) -> Self {
        Self::Invalid(vec![error.to_string()])
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "annopy-server", about = "Collaborative image annotation webapp backend")]
pub struct Options {
    #[structopt(long, help = "address to which to bind")]
    pub address: SocketAddrV4,

    #[structopt(long, help = "SQLite database of annotation state to create or reuse")]
    pub state_file: String,

    #[structopt(long, help = "file containing TLS certificate to use")]
    pub cert_file: Option<String>,

    #[structopt(long, help = "file containing TLS key to use")]
    pub key_file: Option<String>,
}

/// Open (creating if necessary) the database at `state_file` and bring its schema up to date.
pub async fn open(state_file: &str) -> Result<SqliteConnection> {
    let mut conn = format!("sqlite://{}", state_file)
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .foreign_keys(true)
        .connect()
        .await?;

    for statement in schema::DDL_STATEMENTS {
        sqlx::query(statement).execute(&mut conn).await?;
    }

    Ok(conn)
}

fn response() -> response::Builder {
    Response::builder()
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "any")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type, content-length")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "get, post, options, head")
}

fn json_response(json: Vec<u8>) -> Result<Response<Body>> {
    Ok(response()
        .header(header::CONTENT_LENGTH, json.len())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json))?)
}

fn validation_response(error: &CreateError) -> Result<Response<Body>> {
    let json = serde_json::to_vec(&ApiErrors {
        errors: error.messages(),
    })?;

    Ok(response()
        .status(StatusCode::BAD_REQUEST)
        .header(header::CONTENT_LENGTH, json.len())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json))?)
}

fn authorize(header: Option<Bearer>, key: &[u8]) -> Result<Arc<Authorization>, Rejection> {
    let token = header.map(|h| h.body).ok_or_else(|| {
        HttpError::from_slice(
            StatusCode::UNAUTHORIZED,
            "auth token header required",
        )
    })?;

    Ok(auth::authorize(&token, key)?)
}

/// Resolve the claims of a bearer token to the user performing the request.
///
/// Every write is attributed to this user; a token whose subject is missing or no longer registered is rejected
/// rather than guessed at.
async fn acting_user(
    conn: &mut SqliteConnection,
    auth: &Authorization,
) -> Result<store::User> {
    let login = auth.subject.as_deref().ok_or_else(|| {
        HttpError::from_slice(StatusCode::UNAUTHORIZED, "token has no subject")
    })?;

    Ok(store::user_by_login(conn, login).await?.ok_or_else(|| {
        HttpError::from_slice(StatusCode::UNAUTHORIZED, "token subject is not a registered user")
    })?)
}

fn routes(
    conn: &Arc<AsyncMutex<SqliteConnection>>,
    invalid_credential_delay: Duration,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let mut auth_key = [0u8; 32];
    rand::thread_rng().fill(&mut auth_key);

    let auth_mutex = Arc::new(AsyncMutex::new(()));

    let auth = warp::header::optional::<Bearer>("authorization")
        .and_then(move |header| future::ready(authorize(header, &auth_key)));

    warp::post()
        .and(warp::path("token"))
        .and(warp::body::form::<TokenRequest>())
        .and_then({
            let conn = conn.clone();

            move |body| {
                let conn = conn.clone();
                let auth_mutex = auth_mutex.clone();

                async move {
                    auth::authenticate(&conn, &body, &auth_key, &auth_mutex, invalid_credential_delay).await
                }
                .map_err(|e| {
                    warn!("error authorizing: {:?}", e);

                    Rejection::from(HttpError::from(e))
                })
            }
        })
        .or(warp::get()
            .and(
                warp::path!("api" / "collections")
                    .and(warp::query::<CollectionsQuery>())
                    .and_then({
                        let conn = conn.clone();

                        move |query: CollectionsQuery| {
                            let conn = conn.clone();

                            async move {
                                let page = serialize::collections(
                                    conn.lock().await.deref_mut(),
                                    query.q.as_deref(),
                                    query.page.unwrap_or(1),
                                )
                                .await?
                                .ok_or_else(HttpError::not_found)?;

                                json_response(serde_json::to_vec(&page)?)
                            }
                            .map_err(move |e| {
                                warn!("error browsing collections: {:?}", e);

                                Rejection::from(HttpError::from(e))
                            })
                        }
                    })
                    .or(auth.and(warp::path!("api" / "collection" / i64)).and_then({
                        let conn = conn.clone();

                        move |auth, collection_id| {
                            let conn = conn.clone();

                            async move {
                                let document = serialize::collection(
                                    conn.lock().await.deref_mut(),
                                    collection_id,
                                )
                                .await?
                                .ok_or_else(HttpError::not_found)?;

                                json_response(serde_json::to_vec(&document)?)
                            }
                            .map_err(move |e| {
                                warn!(?auth, "error retrieving collection {}: {:?}", collection_id, e);

                                Rejection::from(HttpError::from(e))
                            })
                        }
                    }))
                    .or(auth.and(warp::path!("api" / "image" / i64)).and_then({
                        let conn = conn.clone();

                        move |auth, image_id| {
                            let conn = conn.clone();

                            async move {
                                let document =
                                    serialize::image(conn.lock().await.deref_mut(), image_id)
                                        .await?
                                        .ok_or_else(HttpError::not_found)?;

                                json_response(serde_json::to_vec(&document)?)
                            }
                            .map_err(move |e| {
                                warn!(?auth, "error retrieving image {}: {:?}", image_id, e);

                                Rejection::from(HttpError::from(e))
                            })
                        }
                    })),
            )
            .or(warp::post().and(
                warp::path!("api" / "collections")
                    .and(auth)
                    .and(warp::body::json::<CreateCollectionRequest>())
                    .and_then({
                        let conn = conn.clone();

                        move |auth: Arc<Authorization>, request: CreateCollectionRequest| {
                            let conn = conn.clone();
                            let log_auth = auth.clone();

                            async move {
                                let mut lock = conn.lock().await;
                                let conn = lock.deref_mut();

                                let user = acting_user(conn, &auth).await?;

                                match collections::create_with_images(
                                    conn,
                                    &request.name,
                                    &request.description,
                                    &request.category,
                                    &request.image_urls,
                                    &user,
                                )
                                .await
                                {
                                    Ok(collection) => {
                                        let document =
                                            serialize::collection(conn, collection.collection_id)
                                                .await?
                                                .ok_or_else(|| {
                                                    anyhow!("created collection has no document")
                                                })?;

                                        json_response(serde_json::to_vec(&document)?)
                                    }
                                    Err(error) => validation_response(&error),
                                }
                            }
                            .map_err(move |e| {
                                warn!(auth = ?log_auth, "error creating collection: {:?}", e);

                                Rejection::from(HttpError::from(e))
                            })
                        }
                    })
                    .or(warp::path!("api" / "image" / i64 / "annotations")
                        .and(auth)
                        .and(warp::body::json::<Vec<serde_json::Value>>())
                        .and_then({
                            let conn = conn.clone();

                            move |image_id,
                                  auth: Arc<Authorization>,
                                  bodies: Vec<serde_json::Value>| {
                                let conn = conn.clone();
                                let log_auth = auth.clone();

                                async move {
                                    let mut lock = conn.lock().await;
                                    let conn = lock.deref_mut();

                                    let user = acting_user(conn, &auth).await?;

                                    let image = store::image(conn, image_id)
                                        .await?
                                        .ok_or_else(HttpError::not_found)?;

                                    for body in &bodies {
                                        if let Err(error) =
                                            annotations::create(conn, &image, &body.to_string(), &user)
                                                .await
                                        {
                                            return validation_response(&error);
                                        }
                                    }

                                    let document = serialize::image(conn, image_id)
                                        .await?
                                        .ok_or_else(HttpError::not_found)?;

                                    json_response(serde_json::to_vec(&document)?)
                                }
                                .map_err(move |e| {
                                    warn!(auth = ?log_auth, "error annotating image {}: {:?}", image_id, e);

                                    Rejection::from(HttpError::from(e))
                                })
                            }
                        })),
            )))
        .recover(warp_util::handle_rejection)
        .with(warp::log("annopy"))
}

fn catch_unwind<T>(fun: impl panic::UnwindSafe + FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(fun).map_err(|e| {
        if let Some(s) = e.downcast_ref::<&str>() {
            anyhow!("{}", s)
        } else if let Some(s) = e.downcast_ref::<String>() {
            anyhow!("{}", s)
        } else {
            anyhow!("caught panic")
        }
    })
}

pub async fn serve(conn: &Arc<AsyncMutex<SqliteConnection>>, options: &Arc<Options>) -> Result<()> {
    let routes = routes(conn, Duration::from_secs(INVALID_CREDENTIAL_DELAY_SECS));

    let (address, future) = if let (Some(cert), Some(key)) = (&options.cert_file, &options.key_file) {
        let server = warp::serve(routes).tls().cert_path(cert).key_path(key);

        // As of this writing, warp::TlsServer does not have a try_bind_ephemeral method, so we must catch panics
        // explicitly.
        let (address, future) = catch_unwind(AssertUnwindSafe(move || server.bind_ephemeral(options.address)))?;

        (address, future.boxed())
    } else {
        let (address, future) = warp::serve(routes).try_bind_ephemeral(options.address)?;

        (address, future.boxed())
    };

    info!("listening on {}", address);

    future.await;

    Ok(())
}


#[cfg(test)]
mod test {
    use {
        super::*,
        annopy_shared::{
            CollectionData, CollectionsPage, ImageData, TokenError, TokenSuccess,
        },
        tempfile::TempDir,
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn opening_a_state_file_is_idempotent() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let state_file = tmp_dir
            .path()
            .join("state.db")
            .to_str()
            .ok_or_else(|| anyhow!("invalid UTF-8"))?
            .to_owned();

        let mut conn = open(&state_file).await?;

        users::create(
            &mut conn,
            "Alice",
            "Carroll",
            "alice",
            "alice@example.com",
            "looking-glass",
        )
        .await?;

        drop(conn);

        // Reopening must rerun the schema without clobbering existing rows.
        let mut conn = open(&state_file).await?;

        assert!(store::user_by_login(&mut conn, "alice").await?.is_some());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn it_works() -> Result<()> {
        let mut conn = test_util::connect().await?;

        let user = "alice";
        let password = "looking-glass";

        users::create(&mut conn, "Alice", "Carroll", user, "alice@example.com", password).await?;

        categories::create(&mut conn, "Natural history").await?;

        let conn = Arc::new(AsyncMutex::new(conn));

        let routes = routes(&conn, Duration::from_secs(0));

        let response = warp::test::request()
            .method("POST")
            .path("/token")
            .body("grant_type=password&username=invalid+user&password=invalid+password")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        serde_json::from_slice::<TokenError>(response.body())?;

        let response = warp::test::request()
            .method("POST")
            .path("/token")
            .body(&format!(
                "grant_type=password&username={}&password=invalid+password",
                user
            ))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        serde_json::from_slice::<TokenError>(response.body())?;

        let response = warp::test::request()
            .method("POST")
            .path("/token")
            .body(&format!("grant_type=password&username={}&password={}", user, password))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let token = serde_json::from_slice::<TokenSuccess>(response.body())?.access_token;

        // Reads of a single collection require a token; browsing does not.

        let response = warp::test::request()
            .method("GET")
            .path("/api/collection/1")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = warp::test::request()
            .method("GET")
            .path("/api/collection/1")
            .header("authorization", "Bearer invalid")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = warp::test::request()
            .method("GET")
            .path("/api/collections")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(serde_json::from_slice::<CollectionsPage>(response.body())?.data.is_empty());

        // A validation failure reports every problem in one response.

        let response = warp::test::request()
            .method("POST")
            .path("/api/collections")
            .header("authorization", format!("Bearer {}", token))
            .json(&CreateCollectionRequest {
                name: String::new(),
                description: String::new(),
                category: "Natural".to_string(),
                image_urls: Vec::new(),
            })
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::from_slice::<ApiErrors>(response.body())?.errors.len(),
            2
        );

        let response = warp::test::request()
            .method("POST")
            .path("/api/collections")
            .json(&CreateCollectionRequest {
                name: "Birds".to_string(),
                description: "A collection of birds".to_string(),
                category: "Natural".to_string(),
                image_urls: vec!["https://example.com/1.jpg".to_string()],
            })
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = warp::test::request()
            .method("POST")
            .path("/api/collections")
            .header("authorization", format!("Bearer {}", token))
            .json(&CreateCollectionRequest {
                name: "Birds".to_string(),
                description: "A collection of birds".to_string(),
                category: "Natural".to_string(),
                image_urls: vec!["https://example.com/1.jpg".to_string()],
            })
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let document = serde_json::from_slice::<CollectionData>(response.body())?;

        assert_eq!(document.attributes.name, "Birds");
        assert_eq!(document.images.len(), 1);
        assert_eq!(document.relationships.editions.len(), 1);
        assert_eq!(document.relationships.editions[0].author.attributes.login, user);

        let response = warp::test::request()
            .method("GET")
            .path(&format!("/api/collection/{}", document.id))
            .header("authorization", format!("Bearer {}", token))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(serde_json::from_slice::<CollectionData>(response.body())?, document);

        let response = warp::test::request()
            .method("GET")
            .path("/api/collection/42")
            .header("authorization", format!("Bearer {}", token))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = warp::test::request()
            .method("POST")
            .path("/api/image/1/annotations")
            .header("authorization", format!("Bearer {}", token))
            .json(&vec![
                serde_json::json!({"note": "a heron"}),
                serde_json::json!({"note": "in flight"}),
            ])
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let document = serde_json::from_slice::<ImageData>(response.body())?;

        assert_eq!(document.attributes.annotations.len(), 2);
        assert_eq!(
            document.attributes.annotations[0].attributes.annotation_json,
            serde_json::json!({"note": "a heron"})
        );

        let response = warp::test::request()
            .method("GET")
            .path("/api/image/1")
            .header("authorization", format!("Bearer {}", token))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(serde_json::from_slice::<ImageData>(response.body())?, document);

        let response = warp::test::request()
            .method("POST")
            .path("/api/image/42/annotations")
            .header("authorization", format!("Bearer {}", token))
            .json(&vec![serde_json::json!({"note": "nothing here"})])
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        Ok(())
    }
}
