//! Imports a whole translation from a Bible markup document.
//!
//! Two spellings of the same layout are understood:
//!
//! ```text
//! <bible translation=".." status=".." link="..">
//!   <book number="1" name="Genesis">
//!     <chapter number="1">
//!       <verse number="1">In the beginning ...</verse>
//!
//! <XMLBIBLE biblename=".." status=".." link="..">
//!   <BIBLEBOOK bnumber="1" bname="Genesis">
//!     <CHAPTER cnumber="1">
//!       <VERS vnumber="1">In the beginning ...</VERS>
//! ```
//!
//! Books, chapters and verses are found at any depth below their parent,
//! so grouping elements such as `<testament>` are ignored.
//!
//! The document is parsed and checked completely before anything is
//! written, then every row is inserted inside a single write transaction.
use std::fmt;

use diesel::prelude::*;
use log::{info, warn};
use roxmltree::{Document, Node};

use crate::models::{NewBook, NewTranslation, NewVerse};
use crate::records;
use crate::DbError;

use self::document::{attr, descendants_named, is_named};

pub mod document;

/// Name given to a translation whose document does not declare one.
pub const UNKNOWN_TRANSLATION: &str = "Unknown Translation";

const ROOT: &[&str] = &["bible", "XMLBIBLE"];
const BOOK: &[&str] = &["book", "BIBLEBOOK"];
const CHAPTER: &[&str] = &["chapter"];
const VERSE: &[&str] = &["verse", "VERS"];
const INFORMATION: &[&str] = &["INFORMATION"];
const SOURCE: &[&str] = &["source"];

const TRANSLATION_NAME: &[&str] = &["translation", "biblename", "name"];
const BOOK_NUMBER: &[&str] = &["number", "bnumber", "book"];
const BOOK_NAME: &[&str] = &["name", "bname"];
const CHAPTER_NUMBER: &[&str] = &["number", "cnumber", "chapter"];
const VERSE_NUMBER: &[&str] = &["number", "vnumber", "verse"];

/// How to treat book, chapter and verse numbers that are missing or are not
/// integers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ImportPolicy {
    /// File the row under number 0 and log a warning.
    #[default]
    Lenient,
    /// Reject the whole document with [DbError::Format].
    Strict,
}

impl ImportPolicy {
    fn number(self, element: Node, names: &[&str], context: &str) -> Result<i32, DbError> {
        let raw = attr(element, names);
        if let Some(number) = raw.and_then(|r| r.trim().parse::<i32>().ok()) {
            return Ok(number);
        }

        let element = element.tag_name().name();
        let what = if context.is_empty() {
            format!("{} of {element}", names[0])
        } else {
            format!("{} of {element} in {context}", names[0])
        };
        match self {
            ImportPolicy::Lenient => {
                warn!("Invalid {what} ({raw:?}), using 0");
                Ok(0)
            }
            ImportPolicy::Strict => Err(DbError::Format {
                message: format!("Invalid {what}: {raw:?}."),
            }),
        }
    }
}

/// Progress reported while a document is imported. The `Display` form is a
/// message suitable for showing to a user.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportProgress {
    Parsed {
        name: String,
        books: usize,
        verses: usize,
    },
    TranslationCreated {
        translation_id: i32,
        name: String,
    },
    BookImported {
        name: String,
        imported: usize,
        total: usize,
        verses: usize,
    },
    Completed {
        translation_id: i32,
        name: String,
        verses: usize,
    },
}

impl fmt::Display for ImportProgress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportProgress::Parsed {
                name,
                books,
                verses,
            } => write!(f, "Read {name}: {books} books, {verses} verses"),
            ImportProgress::TranslationCreated {
                translation_id,
                name,
            } => write!(f, "Created translation {name} (#{translation_id})"),
            ImportProgress::BookImported {
                name,
                imported,
                total,
                verses,
            } => write!(
                f,
                "Imported {name} ({imported}/{total} books, {verses} verses so far)"
            ),
            ImportProgress::Completed { name, verses, .. } => {
                write!(f, "Imported {verses} verses of {name}")
            }
        }
    }
}

/// Outcome of a committed import.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportSummary {
    pub translation_id: i32,
    pub name: String,
    pub books: usize,
    pub verses: usize,
}

struct PlannedTranslation {
    name: String,
    status: String,
    link: String,
    books: Vec<PlannedBook>,
}

struct PlannedBook {
    number: i32,
    name: String,
    chapters: Vec<PlannedChapter>,
}

struct PlannedChapter {
    number: i32,
    verses: Vec<(i32, String)>,
}

impl PlannedTranslation {
    fn verse_count(&self) -> usize {
        self.books
            .iter()
            .flat_map(|b| &b.chapters)
            .map(|c| c.verses.len())
            .sum()
    }
}

/// Reads the document tree into the rows that will be written.
fn plan(doc: &Document, policy: ImportPolicy) -> Result<PlannedTranslation, DbError> {
    let root = doc
        .descendants()
        .find(|n| is_named(*n, ROOT))
        .ok_or_else(|| DbError::Format {
            message: format!(
                "No <bible> or <XMLBIBLE> element found, the document starts with <{}>.",
                doc.root_element().tag_name().name()
            ),
        })?;

    let name = attr(root, TRANSLATION_NAME)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_TRANSLATION)
        .to_string();
    let status = attr(root, &["status"]).unwrap_or_default().to_string();
    let link = match attr(root, &["link"]) {
        Some(link) => link.to_string(),
        None => descendants_named(root, INFORMATION)
            .flat_map(|info| descendants_named(info, SOURCE))
            .map(|source| document::text(source).trim().to_string())
            .next()
            .unwrap_or_default(),
    };

    let mut books = Vec::new();
    for book in descendants_named(root, BOOK) {
        let number = policy.number(book, BOOK_NUMBER, "")?;
        let book_name = match attr(book, BOOK_NAME).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Book {number}"),
        };

        let mut chapters = Vec::new();
        for chapter in descendants_named(book, CHAPTER) {
            let chapter_number = policy.number(chapter, CHAPTER_NUMBER, &book_name)?;
            let context = format!("{book_name} {chapter_number}");
            let verses = descendants_named(chapter, VERSE)
                .map(|verse| {
                    let verse_number = policy.number(verse, VERSE_NUMBER, &context)?;
                    Ok::<_, DbError>((verse_number, document::text(verse).trim().to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            chapters.push(PlannedChapter {
                number: chapter_number,
                verses,
            });
        }

        books.push(PlannedBook {
            number,
            name: book_name,
            chapters,
        });
    }

    Ok(PlannedTranslation {
        name,
        status,
        link,
        books,
    })
}

/// Imports a complete translation from `text`.
///
/// The document is rejected with [DbError::Format] before any write when
/// it is not well-formed XML, when it has no `<bible>` or `<XMLBIBLE>`
/// element, or (under [ImportPolicy::Strict]) when a number is invalid. All rows are written in one transaction; if any
/// write fails, such as a book number repeated within the document, none
/// of them are kept. Importing the same document twice creates two
/// independent translations.
///
/// `on_progress` is informational only. [ImportProgress::Completed] is sent
/// after the transaction commits.
pub fn import_document<F>(
    conn: &mut SqliteConnection,
    text: &str,
    policy: ImportPolicy,
    mut on_progress: F,
) -> Result<ImportSummary, DbError>
where
    F: FnMut(&ImportProgress),
{
    let doc = document::parse(text)?;
    let planned = plan(&doc, policy)?;
    drop(doc);

    let total_verses = planned.verse_count();
    on_progress(&ImportProgress::Parsed {
        name: planned.name.clone(),
        books: planned.books.len(),
        verses: total_verses,
    });

    let translation_id = records::write_transaction(conn, |conn| {
        let translation_id = records::insert_translation(
            conn,
            &NewTranslation {
                name: &planned.name,
                status: &planned.status,
                link: &planned.link,
            },
        )?;
        on_progress(&ImportProgress::TranslationCreated {
            translation_id,
            name: planned.name.clone(),
        });

        let mut verses = 0;
        for (i, book) in planned.books.iter().enumerate() {
            records::insert_book(
                conn,
                &NewBook {
                    translation_id,
                    number: book.number,
                    name: &book.name,
                },
            )?;

            for chapter in &book.chapters {
                let rows: Vec<NewVerse> = chapter
                    .verses
                    .iter()
                    .map(|(verse, words)| NewVerse {
                        translation_id,
                        book: book.number,
                        chapter: chapter.number,
                        verse: *verse,
                        words,
                    })
                    .collect();
                verses += records::insert_verses(conn, &rows)?;
            }

            on_progress(&ImportProgress::BookImported {
                name: book.name.clone(),
                imported: i + 1,
                total: planned.books.len(),
                verses,
            });
        }
        Ok(translation_id)
    })?;

    info!(
        "Imported translation {} (#{}) with {} books and {} verses",
        planned.name,
        translation_id,
        planned.books.len(),
        total_verses
    );
    on_progress(&ImportProgress::Completed {
        translation_id,
        name: planned.name.clone(),
        verses: total_verses,
    });

    Ok(ImportSummary {
        translation_id,
        name: planned.name,
        books: planned.books.len(),
        verses: total_verses,
    })
}
