//! Annopy shared (e.g. protocol) code
//!
//! This crate contains the [serde](https://crates.io/crates/serde)-enabled structs and enums which define the
//! JSON surface of the Annopy server: the nested resource documents produced by the read API, the request bodies
//! accepted by the write API, and the OAuth 2 style token exchange used to authenticate.

#![deny(warnings)]

use {
    serde_derive::{Deserialize, Serialize},
    serde_json::Value,
};

/// OAuth 2 grant type (we currently only support the "password" type)
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Password,
}

/// OAuth 2 "password" type authentication request
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    pub username: String,
    pub password: String,
}

/// OAuth 2 access token type (we currently only support the "jwt" type)
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Jwt,
}

/// OAuth 2 authentication success response
#[derive(Serialize, Deserialize)]
pub struct TokenSuccess {
    pub access_token: String,
    pub token_type: TokenType,
}

/// OAuth 2 authentication error type
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorType {
    UnauthorizedClient,
}

/// OAuth 2 authentication error response
#[derive(Serialize, Deserialize)]
pub struct TokenError {
    pub error: TokenErrorType,
    pub error_description: Option<String>,
}

/// JWT claims carried by an Annopy bearer token
#[derive(Serialize, Deserialize, Debug)]
pub struct Authorization {
    /// When this token expires (in seconds since the start of 1970 UTC)
    ///
    /// `None` means it never expires.
    #[serde(rename = "exp")]
    pub expiration: Option<u64>,

    /// Login of the user this token represents
    #[serde(rename = "sub")]
    pub subject: Option<String>,
}

/// Discriminator carried in the "type" field of every serialized resource
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Collection,
    Category,
    Image,
    Annotation,
    People,
}

/// Hyperlinks attached to a serialized collection
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct Links {
    /// Path of the human-readable page for this resource
    #[serde(rename = "self")]
    pub page: String,

    /// Path of this document itself
    pub json: String,
}

/// Minimal public projection of a user
///
/// This is the only form in which a user ever appears in serialized output; the email and password hash are
/// deliberately absent.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct PersonData {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub attributes: PersonAttributes,
}

/// See [PersonData]
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct PersonAttributes {
    pub id: i64,
    pub login: String,
    pub forename: String,
    pub surname: String,
}

/// One authorship record: who created the parent resource, and when
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct EditionData {
    pub author: PersonData,
    pub on: String,
}

/// The list-valued relationships of a serialized resource
///
/// Entries appear in the order the underlying authorship rows were inserted; the server never re-sorts them.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct Relationships {
    pub editions: Vec<EditionData>,
}

/// A serialized category
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct CategoryData {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub attributes: CategoryAttributes,
}

/// See [CategoryData]
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct CategoryAttributes {
    pub id: i64,
    pub name: String,
}

/// A serialized annotation, with its body parsed back into structured JSON
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct AnnotationData {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub attributes: AnnotationAttributes,
}

/// See [AnnotationData]
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct AnnotationAttributes {
    pub id: i64,
    pub annotation_json: Value,
    pub relationships: Relationships,
}

/// A serialized image, with its annotations fully expanded
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ImageData {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub attributes: ImageAttributes,
}

/// See [ImageData]
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ImageAttributes {
    pub id: i64,
    pub url: String,
    pub annotations: Vec<AnnotationData>,
}

/// A serialized collection and its transitive relationships
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CollectionData {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub id: i64,
    pub attributes: CollectionAttributes,
    pub relationships: Relationships,
    pub images: Vec<ImageData>,
    pub links: Links,
}

/// See [CollectionData]
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CollectionAttributes {
    pub name: String,
    pub categories: Vec<CategoryData>,
    pub description: String,
}

/// Pagination links for a browse/search response
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct PageLinks {
    #[serde(rename = "self")]
    pub page: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

/// Response to a GET /api/collections request: one page of matching collections
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CollectionsPage {
    pub links: PageLinks,
    pub data: Vec<CollectionData>,
}

/// Query string of a GET /api/collections request
#[derive(Serialize, Deserialize, Debug)]
pub struct CollectionsQuery {
    /// Optional keyword to match against collection names
    pub q: Option<String>,

    /// 1-based page number; when absent, page 1 is assumed
    pub page: Option<u32>,
}

/// Body of a POST /api/collections request
///
/// The image URLs are expected to have been resolved already (e.g. extracted from a IIIF manifest or a Flickr
/// album) -- the server does not fetch anything itself.
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: String,

    /// Name of an existing category to file the collection under
    pub category: String,

    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Error list returned by write endpoints when validation fails
///
/// Contains one entry per problem found, so a client can report all of them at once.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct ApiErrors {
    pub errors: Vec<String>,
}
