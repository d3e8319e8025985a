#![deny(warnings)]

pub static DDL_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
       user_id        INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       forename       TEXT NOT NULL,
       surname        TEXT NOT NULL,
       login          TEXT NOT NULL UNIQUE,
       email          TEXT NOT NULL UNIQUE,
       password_hash  TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS categories (
       category_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       name         TEXT NOT NULL UNIQUE
     )",
    "CREATE TABLE IF NOT EXISTS collections (
       collection_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       name           TEXT NOT NULL UNIQUE,
       description    TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS images (
       image_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       url       TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS annotations (
       annotation_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       body           TEXT NOT NULL,
       image_id       INTEGER NOT NULL,

       FOREIGN KEY (image_id) REFERENCES images(image_id) ON DELETE CASCADE
     )",
    "CREATE TABLE IF NOT EXISTS collection_authorships (
       authorship_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       collection_id  INTEGER NOT NULL,
       user_id        INTEGER NOT NULL,
       created_at     TEXT NOT NULL,

       FOREIGN KEY (collection_id) REFERENCES collections(collection_id) ON DELETE CASCADE,
       FOREIGN KEY (user_id) REFERENCES users(user_id)
     )",
    "CREATE TABLE IF NOT EXISTS annotation_authorships (
       authorship_id  INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       annotation_id  INTEGER NOT NULL,
       user_id        INTEGER NOT NULL,
       created_at     TEXT NOT NULL,

       FOREIGN KEY (annotation_id) REFERENCES annotations(annotation_id) ON DELETE CASCADE,
       FOREIGN KEY (user_id) REFERENCES users(user_id)
     )",
    "CREATE TABLE IF NOT EXISTS collection_categories (
       link_id        INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       collection_id  INTEGER NOT NULL,
       category_id    INTEGER NOT NULL,

       FOREIGN KEY (collection_id) REFERENCES collections(collection_id) ON DELETE CASCADE,
       FOREIGN KEY (category_id) REFERENCES categories(category_id)
     )",
    "CREATE TABLE IF NOT EXISTS collection_images (
       link_id        INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
       collection_id  INTEGER NOT NULL,
       image_id       INTEGER NOT NULL,

       FOREIGN KEY (collection_id) REFERENCES collections(collection_id) ON DELETE CASCADE,
       FOREIGN KEY (image_id) REFERENCES images(image_id) ON DELETE CASCADE
     )",
];
