//! Primitive access to the three collections: inserts, full reads and
//! ordered scans over the declared secondary indexes.
//!
//! Everything above this module (the import pipeline and the query engine)
//! reads and writes rows only through these functions.
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error};
use diesel::sql_types::BigInt;
use diesel::sqlite::Sqlite;
use log::debug;

use crate::models::{Book, NewBook, NewTranslation, NewVerse, Translation, Verse};
use crate::schema::{books, translations, verses};
use crate::DbError;

/// A range of composite index keys. The leading `prefix` components must
/// match exactly; the next component, if any, is optionally bounded
/// (inclusively) on either side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyRange {
    pub prefix: Vec<i32>,
    pub lower: Option<i32>,
    pub upper: Option<i32>,
}

impl KeyRange {
    /// Every key starting with `prefix`. Also used for fully fixed keys.
    pub fn prefix(prefix: impl Into<Vec<i32>>) -> Self {
        KeyRange {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Keys starting with `prefix` whose next component lies in `lower..=upper`.
    pub fn between(prefix: impl Into<Vec<i32>>, lower: i32, upper: i32) -> Self {
        KeyRange {
            prefix: prefix.into(),
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    fn is_bounded(&self) -> bool {
        self.lower.is_some() || self.upper.is_some()
    }

    /// Checks that the range can be expressed against an index of `width` columns.
    fn check(&self, index: &'static str, width: usize) -> Result<(), DbError> {
        let fixed = self.prefix.len() + usize::from(self.is_bounded());
        if fixed > width {
            return Err(DbError::InvalidKeyRange { index });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BookColumn {
    TranslationId,
    Number,
}

/// Secondary indexes over the `books` collection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BookIndex {
    /// Unique `(translation_id, number)`.
    ByNumber,
}

impl BookIndex {
    pub fn name(self) -> &'static str {
        match self {
            BookIndex::ByNumber => "books_by_number",
        }
    }

    fn columns(self) -> &'static [BookColumn] {
        match self {
            BookIndex::ByNumber => &[BookColumn::TranslationId, BookColumn::Number],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum VerseColumn {
    TranslationId,
    Book,
    Chapter,
    Verse,
}

/// Secondary indexes over the `verses` collection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VerseIndex {
    /// `(translation_id, book)`, for per-book scans.
    ByBook,
    /// `(translation_id, book, chapter)`, for exact chapter lookups.
    ByChapter,
    /// `(translation_id, book, chapter, verse)`, for ordered verse ranges.
    ByVerse,
}

impl VerseIndex {
    pub fn name(self) -> &'static str {
        match self {
            VerseIndex::ByBook => "verses_by_book",
            VerseIndex::ByChapter => "verses_by_chapter",
            VerseIndex::ByVerse => "verses_by_verse",
        }
    }

    fn columns(self) -> &'static [VerseColumn] {
        static BY_VERSE: [VerseColumn; 4] = [
            VerseColumn::TranslationId,
            VerseColumn::Book,
            VerseColumn::Chapter,
            VerseColumn::Verse,
        ];

        match self {
            VerseIndex::ByBook => &BY_VERSE[..2],
            VerseIndex::ByChapter => &BY_VERSE[..3],
            VerseIndex::ByVerse => &BY_VERSE,
        }
    }
}

type BoxedBooks = books::BoxedQuery<'static, Sqlite>;
type BoxedVerses = verses::BoxedQuery<'static, Sqlite>;

impl BookColumn {
    fn filter_eq(self, query: BoxedBooks, value: i32) -> BoxedBooks {
        match self {
            BookColumn::TranslationId => query.filter(books::translation_id.eq(value)),
            BookColumn::Number => query.filter(books::number.eq(value)),
        }
    }

    fn filter_ge(self, query: BoxedBooks, value: i32) -> BoxedBooks {
        match self {
            BookColumn::TranslationId => query.filter(books::translation_id.ge(value)),
            BookColumn::Number => query.filter(books::number.ge(value)),
        }
    }

    fn filter_le(self, query: BoxedBooks, value: i32) -> BoxedBooks {
        match self {
            BookColumn::TranslationId => query.filter(books::translation_id.le(value)),
            BookColumn::Number => query.filter(books::number.le(value)),
        }
    }

    fn order_by(self, query: BoxedBooks) -> BoxedBooks {
        match self {
            BookColumn::TranslationId => query.then_order_by(books::translation_id.asc()),
            BookColumn::Number => query.then_order_by(books::number.asc()),
        }
    }
}

impl VerseColumn {
    fn filter_eq(self, query: BoxedVerses, value: i32) -> BoxedVerses {
        match self {
            VerseColumn::TranslationId => query.filter(verses::translation_id.eq(value)),
            VerseColumn::Book => query.filter(verses::book.eq(value)),
            VerseColumn::Chapter => query.filter(verses::chapter.eq(value)),
            VerseColumn::Verse => query.filter(verses::verse.eq(value)),
        }
    }

    fn filter_ge(self, query: BoxedVerses, value: i32) -> BoxedVerses {
        match self {
            VerseColumn::TranslationId => query.filter(verses::translation_id.ge(value)),
            VerseColumn::Book => query.filter(verses::book.ge(value)),
            VerseColumn::Chapter => query.filter(verses::chapter.ge(value)),
            VerseColumn::Verse => query.filter(verses::verse.ge(value)),
        }
    }

    fn filter_le(self, query: BoxedVerses, value: i32) -> BoxedVerses {
        match self {
            VerseColumn::TranslationId => query.filter(verses::translation_id.le(value)),
            VerseColumn::Book => query.filter(verses::book.le(value)),
            VerseColumn::Chapter => query.filter(verses::chapter.le(value)),
            VerseColumn::Verse => query.filter(verses::verse.le(value)),
        }
    }

    fn order_by(self, query: BoxedVerses) -> BoxedVerses {
        match self {
            VerseColumn::TranslationId => query.then_order_by(verses::translation_id.asc()),
            VerseColumn::Book => query.then_order_by(verses::book.asc()),
            VerseColumn::Chapter => query.then_order_by(verses::chapter.asc()),
            VerseColumn::Verse => query.then_order_by(verses::verse.asc()),
        }
    }
}

/// Maps a failed write into a store error naming the collection written to.
fn write_error(collection: &'static str) -> impl Fn(Error) -> DbError {
    move |e| match e {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => DbError::Constraint {
            collection,
            cause: info.message().to_string(),
        },
        e => DbError::Other {
            cause: format!("Could not write to {collection}. Cause: {e}"),
        },
    }
}

fn last_insert_id(conn: &mut SqliteConnection, collection: &'static str) -> Result<i32, DbError> {
    let id: i64 = diesel::select(sql::<BigInt>("last_insert_rowid()"))
        .get_result(conn)
        .map_err(write_error(collection))?;
    i32::try_from(id).map_err(|_| DbError::Other {
        cause: format!("Identity {id} assigned in {collection} is out of range."),
    })
}

/// Inserts a translation header and returns its assigned id.
pub fn insert_translation(
    conn: &mut SqliteConnection,
    translation: &NewTranslation,
) -> Result<i32, DbError> {
    diesel::insert_into(translations::table)
        .values(translation)
        .execute(conn)
        .map_err(write_error("translations"))?;
    last_insert_id(conn, "translations")
}

/// Inserts a book and returns its assigned id. A second book with the same
/// number in one translation is a [DbError::Constraint].
pub fn insert_book(conn: &mut SqliteConnection, book: &NewBook) -> Result<i32, DbError> {
    diesel::insert_into(books::table)
        .values(book)
        .execute(conn)
        .map_err(write_error("books"))?;
    last_insert_id(conn, "books")
}

/// Inserts a batch of verses, returning how many rows were written.
pub fn insert_verses(conn: &mut SqliteConnection, batch: &[NewVerse]) -> Result<usize, DbError> {
    if batch.is_empty() {
        return Ok(0);
    }
    diesel::insert_into(verses::table)
        .values(batch)
        .execute(conn)
        .map_err(write_error("verses"))
}

/// Loads every translation, in no particular order.
pub fn all_translations(conn: &mut SqliteConnection) -> Result<Vec<Translation>, DbError> {
    translations::table.load(conn).map_err(|e| DbError::Other {
        cause: format!("Could not load translations. Cause: {e}"),
    })
}

/// Opens a forward-only cursor over the books matching `range`, in index
/// key order. Rows are read from SQLite as the cursor advances.
pub fn scan_books<'conn>(
    conn: &'conn mut SqliteConnection,
    index: BookIndex,
    range: &KeyRange,
) -> Result<impl Iterator<Item = QueryResult<Book>> + 'conn, DbError> {
    let columns = index.columns();
    range.check(index.name(), columns.len())?;
    debug!("Scanning {} over {:?}", index.name(), range);

    let mut query = books::table.into_boxed();
    for (column, value) in columns.iter().zip(&range.prefix) {
        query = column.filter_eq(query, *value);
    }
    if let Some(column) = columns.get(range.prefix.len()) {
        if let Some(lower) = range.lower {
            query = column.filter_ge(query, lower);
        }
        if let Some(upper) = range.upper {
            query = column.filter_le(query, upper);
        }
    }
    for column in columns {
        query = column.order_by(query);
    }

    Ok(query
        .then_order_by(books::id.asc())
        .load_iter::<Book, diesel::connection::DefaultLoadingMode>(conn)?)
}

/// Opens a forward-only cursor over the verses matching `range`, in index
/// key order. Ties within a key keep insertion order.
pub fn scan_verses<'conn>(
    conn: &'conn mut SqliteConnection,
    index: VerseIndex,
    range: &KeyRange,
) -> Result<impl Iterator<Item = QueryResult<Verse>> + 'conn, DbError> {
    let columns = index.columns();
    range.check(index.name(), columns.len())?;
    debug!("Scanning {} over {:?}", index.name(), range);

    let mut query = verses::table.into_boxed();
    for (column, value) in columns.iter().zip(&range.prefix) {
        query = column.filter_eq(query, *value);
    }
    if let Some(column) = columns.get(range.prefix.len()) {
        if let Some(lower) = range.lower {
            query = column.filter_ge(query, lower);
        }
        if let Some(upper) = range.upper {
            query = column.filter_le(query, upper);
        }
    }
    for column in columns {
        query = column.order_by(query);
    }

    Ok(query
        .then_order_by(verses::id.asc())
        .load_iter::<Verse, diesel::connection::DefaultLoadingMode>(conn)?)
}

/// Runs `f` inside one write transaction. The transaction commits only if
/// `f` returns `Ok`; otherwise none of its writes become visible.
pub fn write_transaction<T, F>(conn: &mut SqliteConnection, f: F) -> Result<T, DbError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, DbError>,
{
    conn.immediate_transaction(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrated_connection;

    fn seed(conn: &mut SqliteConnection) -> i32 {
        let id = insert_translation(
            conn,
            &NewTranslation {
                name: "Test",
                status: "",
                link: "",
            },
        )
        .unwrap();
        let rows: Vec<NewVerse> = [(2, 1, 2), (1, 2, 1), (1, 1, 3), (1, 1, 1), (1, 1, 2)]
            .into_iter()
            .map(|(book, chapter, verse)| NewVerse {
                translation_id: id,
                book,
                chapter,
                verse,
                words: "",
            })
            .collect();
        assert_eq!(insert_verses(conn, &rows).unwrap(), 5);
        id
    }

    fn keys(
        conn: &mut SqliteConnection,
        index: VerseIndex,
        range: &KeyRange,
    ) -> Vec<(i32, i32, i32)> {
        scan_verses(conn, index, range)
            .unwrap()
            .map(|v| v.map(|v| (v.book, v.chapter, v.verse)))
            .collect::<QueryResult<_>>()
            .unwrap()
    }

    #[test]
    fn ids_increase() {
        let mut conn = migrated_connection();
        let first = seed(&mut conn);
        let second = seed(&mut conn);
        assert!(second > first);
        assert_eq!(all_translations(&mut conn).unwrap().len(), 2);
    }

    #[test]
    fn scans_follow_index_order() {
        let mut conn = migrated_connection();
        let id = seed(&mut conn);

        assert_eq!(
            keys(&mut conn, VerseIndex::ByVerse, &KeyRange::prefix([id])),
            vec![(1, 1, 1), (1, 1, 2), (1, 1, 3), (1, 2, 1), (2, 1, 2)]
        );
        assert_eq!(
            keys(&mut conn, VerseIndex::ByVerse, &KeyRange::between([id, 1, 1], 2, 3)),
            vec![(1, 1, 2), (1, 1, 3)]
        );
        assert_eq!(
            keys(&mut conn, VerseIndex::ByBook, &KeyRange::prefix([id, 2])),
            vec![(2, 1, 2)]
        );
        assert!(keys(&mut conn, VerseIndex::ByChapter, &KeyRange::prefix([id + 1])).is_empty());
    }

    #[test]
    fn rejects_ranges_wider_than_the_index() {
        let mut conn = migrated_connection();
        let range = KeyRange::between([1, 1], 1, 2);
        assert_eq!(
            scan_verses(&mut conn, VerseIndex::ByBook, &range).err(),
            Some(DbError::InvalidKeyRange {
                index: "verses_by_book"
            })
        );
        assert!(scan_books(&mut conn, BookIndex::ByNumber, &KeyRange::prefix([1, 1])).is_ok());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut conn = migrated_connection();

        let result = write_transaction(&mut conn, |conn| {
            let id = seed(conn);
            let book = NewBook {
                translation_id: id,
                number: 1,
                name: "Genesis",
            };
            insert_book(conn, &book)?;
            insert_book(conn, &book)
        });

        assert!(matches!(
            result,
            Err(DbError::Constraint {
                collection: "books",
                ..
            })
        ));
        assert!(all_translations(&mut conn).unwrap().is_empty());
        assert!(keys(&mut conn, VerseIndex::ByBook, &KeyRange::default()).is_empty());
    }
}
