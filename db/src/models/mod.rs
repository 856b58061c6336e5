use diesel::prelude::*;
use serde_derive::Serialize;

use crate::schema::{books, translations, verses};

/// Model representing one imported edition of the Bible.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct Translation {
    pub id: i32,
    pub name: String,
    pub status: String,
    pub link: String,
}

/// Model representing a book in a translation. The `number` is the
/// canonical 1-based position of the book, unique per translation.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct Book {
    pub id: i32,
    pub translation_id: i32,
    pub number: i32,
    pub name: String,
}

/// Model representing a Bible verse.
#[derive(Clone, Debug, PartialEq, Queryable, Serialize)]
pub struct Verse {
    pub id: i32,
    pub translation_id: i32,
    pub book: i32,
    pub chapter: i32,
    pub verse: i32,
    pub words: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = translations)]
pub struct NewTranslation<'a> {
    pub name: &'a str,
    pub status: &'a str,
    pub link: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = books)]
pub struct NewBook<'a> {
    pub translation_id: i32,
    pub number: i32,
    pub name: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = verses)]
pub struct NewVerse<'a> {
    pub translation_id: i32,
    pub book: i32,
    pub chapter: i32,
    pub verse: i32,
    pub words: &'a str,
}

/// One book of a translation's navigation tree, along with the chapters
/// that actually contain verses, in ascending order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavigationEntry {
    pub book: String,
    pub book_number: i32,
    pub chapters: Vec<i32>,
}

mod reference;
pub use self::reference::Reference;
