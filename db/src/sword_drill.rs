use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;

use diesel::prelude::*;

use crate::models::*;
use crate::records::{self, BookIndex, KeyRange, VerseIndex};
use crate::DbError;

/// Trait implemented by types that can query for and return types of Bible structures.
///
/// A lookup that matches nothing returns an empty result rather than an error.
pub trait SwordDrillable {
    /// Lists every imported translation, in no particular order.
    fn translations(conn: &mut SqliteConnection) -> Result<Vec<Translation>, DbError>;

    /// Builds the navigation tree of a translation: its books ordered by
    /// number, each with the sorted chapters that contain at least one verse.
    fn navigation(
        translation_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<NavigationEntry>, DbError>;

    /// Looks up all verses of a chapter, ordered by verse number.
    fn chapter(
        translation_id: i32,
        book: i32,
        chapter: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Verse>, DbError>;

    /// Looks up the verses of a chapter whose numbers fall in `verses`,
    /// ordered by verse number. An empty range yields no verses.
    fn verse_range(
        translation_id: i32,
        book: i32,
        chapter: i32,
        verses: RangeInclusive<i32>,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Verse>, DbError>;

    /// Looks up a book of a translation by name, ignoring case.
    ///
    /// An exact name wins; otherwise the lowest-numbered book whose name
    /// starts with `book_name` is returned, so `gen` finds Genesis.
    fn book(
        translation_id: i32,
        book_name: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Book, DbError>;
}

/// Main implementation for the [SwordDrillable](crate::sword_drill::SwordDrillable) trait.
pub struct SwordDrill;

fn collect<T>(cursor: impl Iterator<Item = QueryResult<T>>) -> Result<Vec<T>, DbError> {
    cursor
        .collect::<QueryResult<Vec<T>>>()
        .map_err(DbError::from)
}

impl SwordDrillable for SwordDrill {
    fn translations(conn: &mut SqliteConnection) -> Result<Vec<Translation>, DbError> {
        records::all_translations(conn)
    }

    fn navigation(
        translation_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<NavigationEntry>, DbError> {
        let whole_translation = KeyRange::prefix([translation_id]);

        let mut names = HashMap::new();
        for book in records::scan_books(conn, BookIndex::ByNumber, &whole_translation)? {
            let book = book?;
            names.insert(book.number, book.name);
        }

        // Chapters are only known from the verses that exist, not from the
        // books' declared structure.
        let mut tree: BTreeMap<i32, (String, BTreeSet<i32>)> = BTreeMap::new();
        for verse in records::scan_verses(conn, VerseIndex::ByBook, &whole_translation)? {
            let verse = verse?;
            tree.entry(verse.book)
                .or_insert_with(|| {
                    let name = names
                        .remove(&verse.book)
                        .unwrap_or_else(|| format!("Book {}", verse.book));
                    (name, BTreeSet::new())
                })
                .1
                .insert(verse.chapter);
        }

        Ok(tree
            .into_iter()
            .map(|(book_number, (book, chapters))| NavigationEntry {
                book,
                book_number,
                chapters: chapters.into_iter().collect(),
            })
            .collect())
    }

    fn chapter(
        translation_id: i32,
        book: i32,
        chapter: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Verse>, DbError> {
        let range = KeyRange::prefix([translation_id, book, chapter]);
        let mut verses = collect(records::scan_verses(conn, VerseIndex::ByChapter, &range)?)?;
        // The chapter index stops short of the verse number.
        verses.sort_by_key(|v| v.verse);
        Ok(verses)
    }

    fn verse_range(
        translation_id: i32,
        book: i32,
        chapter: i32,
        verses: RangeInclusive<i32>,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Verse>, DbError> {
        if verses.is_empty() {
            return Ok(vec![]);
        }
        let range = KeyRange::between(
            [translation_id, book, chapter],
            *verses.start(),
            *verses.end(),
        );
        collect(records::scan_verses(conn, VerseIndex::ByVerse, &range)?)
    }

    fn book(
        translation_id: i32,
        book_name: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Book, DbError> {
        let wanted = book_name.trim().to_lowercase();
        let range = KeyRange::prefix([translation_id]);
        let books = collect(records::scan_books(conn, BookIndex::ByNumber, &range)?)?;

        let exact = books.iter().position(|b| b.name.to_lowercase() == wanted);
        let found = exact.or_else(|| {
            books
                .iter()
                .position(|b| !wanted.is_empty() && b.name.to_lowercase().starts_with(&wanted))
        });

        match found {
            Some(i) => Ok(books[i].clone()),
            None => Err(DbError::BookNotFound {
                book: book_name.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{import_document, migrated_connection, ImportPolicy};

    const PSALMS: &str = r#"<XMLBIBLE biblename="Test">
        <BIBLEBOOK bnumber="19" bname="Psalms">
            <CHAPTER cnumber="119">
                <VERS vnumber="106">I have sworn</VERS>
                <VERS vnumber="104">Through thy precepts</VERS>
                <VERS vnumber="105">Thy word is a lamp unto my feet</VERS>
            </CHAPTER>
            <CHAPTER cnumber="1"><VERS vnumber="1">Blessed is the man</VERS></CHAPTER>
            <CHAPTER cnumber="150"></CHAPTER>
        </BIBLEBOOK>
        <BIBLEBOOK bnumber="1" bname="Genesis">
            <CHAPTER cnumber="2"><VERS vnumber="1">Thus the heavens</VERS></CHAPTER>
            <CHAPTER cnumber="1"><VERS vnumber="1">In the beginning</VERS></CHAPTER>
        </BIBLEBOOK>
        <BIBLEBOOK bnumber="2" bname="Exodus"/>
    </XMLBIBLE>"#;

    fn seeded() -> (SqliteConnection, i32) {
        let mut conn = migrated_connection();
        let summary = import_document(&mut conn, PSALMS, ImportPolicy::Lenient, |_| {}).unwrap();
        (conn, summary.translation_id)
    }

    fn numbers(verses: &[Verse]) -> Vec<i32> {
        verses.iter().map(|v| v.verse).collect()
    }

    #[test]
    fn navigation_lists_populated_chapters() {
        let (mut conn, id) = seeded();
        let nav = SwordDrill::navigation(id, &mut conn).unwrap();

        assert_eq!(
            nav,
            vec![
                NavigationEntry {
                    book: "Genesis".to_string(),
                    book_number: 1,
                    chapters: vec![1, 2],
                },
                NavigationEntry {
                    book: "Psalms".to_string(),
                    book_number: 19,
                    chapters: vec![1, 119],
                },
            ]
        );
        assert_eq!(SwordDrill::navigation(id, &mut conn).unwrap(), nav);
        assert!(SwordDrill::navigation(id + 1, &mut conn).unwrap().is_empty());
    }

    #[test]
    fn chapter_is_sorted_by_verse() {
        let (mut conn, id) = seeded();
        let verses = SwordDrill::chapter(id, 19, 119, &mut conn).unwrap();

        assert_eq!(numbers(&verses), vec![104, 105, 106]);
        assert_eq!(verses[1].words, "Thy word is a lamp unto my feet");
        assert!(SwordDrill::chapter(id, 19, 150, &mut conn).unwrap().is_empty());
    }

    #[test]
    fn verse_range_matches_filtered_chapter() {
        let (mut conn, id) = seeded();
        let chapter = SwordDrill::chapter(id, 19, 119, &mut conn).unwrap();

        for start in 100..=108 {
            for end in start..=108 {
                let expected: Vec<Verse> = chapter
                    .iter()
                    .filter(|v| (start..=end).contains(&v.verse))
                    .cloned()
                    .collect();
                let range = SwordDrill::verse_range(id, 19, 119, start..=end, &mut conn).unwrap();
                assert_eq!(range, expected, "verses {start}-{end}");
            }
        }
    }

    #[test]
    fn inverted_verse_range_is_empty() {
        let (mut conn, id) = seeded();
        let range = SwordDrill::verse_range(id, 19, 119, 106..=104, &mut conn).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn sample_scenario() {
        let mut conn = migrated_connection();
        let summary = import_document(
            &mut conn,
            r#"<XMLBIBLE biblename="Sample"><BIBLEBOOK bnumber="1" bname="Genesis">
                <CHAPTER cnumber="1">
                    <VERS vnumber="1">In the beginning</VERS><VERS vnumber="2">text2</VERS>
                </CHAPTER>
            </BIBLEBOOK></XMLBIBLE>"#,
            ImportPolicy::Lenient,
            |_| {},
        )
        .unwrap();
        let id = summary.translation_id;

        let translations = SwordDrill::translations(&mut conn).unwrap();
        assert_eq!(translations.len(), 1);
        assert_eq!(translations[0].name, "Sample");

        assert_eq!(
            SwordDrill::navigation(id, &mut conn).unwrap(),
            vec![NavigationEntry {
                book: "Genesis".to_string(),
                book_number: 1,
                chapters: vec![1],
            }]
        );

        let chapter = SwordDrill::chapter(id, 1, 1, &mut conn).unwrap();
        assert_eq!(numbers(&chapter), vec![1, 2]);
        assert_eq!(chapter[0].words, "In the beginning");

        let range = SwordDrill::verse_range(id, 1, 1, 1..=1, &mut conn).unwrap();
        assert_eq!(numbers(&range), vec![1]);
    }

    #[test]
    fn book_lookup() {
        let (mut conn, id) = seeded();

        assert_eq!(SwordDrill::book(id, "psalms", &mut conn).unwrap().number, 19);
        assert_eq!(SwordDrill::book(id, "Ex", &mut conn).unwrap().name, "Exodus");
        assert_eq!(
            SwordDrill::book(id, "Jude", &mut conn),
            Err(DbError::BookNotFound {
                book: "Jude".to_string()
            })
        );
        assert!(SwordDrill::book(id, " ", &mut conn).is_err());
    }
}
