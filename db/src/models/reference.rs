use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Match, Regex};
use serde_derive::Serialize;

use crate::DbError;

/// A textual Bible reference such as `John 3:16` or `1 Cor 13:4-7`,
/// resolved against a translation's book names before looking up verses.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reference {
    pub book: String,
    pub chapter: i32,
    pub verses: Option<RangeInclusive<i32>>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.verses {
            None => write!(f, "{} {}", self.book, self.chapter),
            Some(verses) if verses.start() == verses.end() => {
                write!(f, "{} {}:{}", self.book, self.chapter, verses.start())
            }
            Some(verses) => write!(
                f,
                "{} {}:{}-{}",
                self.book,
                self.chapter,
                verses.start(),
                verses.end()
            ),
        }
    }
}

impl FromStr for Reference {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Reference, Self::Err> {
        lazy_static! {
            static ref REF_RE: Regex =
                Regex::new(r"^(\w+(?: [a-zA-Z]+(?: [a-zA-Z]+)?)?)(?:\.| )((?:[0-9\-:\.])+)$")
                    .unwrap();
            static ref CV_RE: Regex =
                Regex::new(r"^(\d{1,3})(?:[:\.](\d{1,3})?(?:-(\d{1,3}))?)?$").unwrap();
        }

        let ref_caps = REF_RE
            .captures(s.trim())
            .ok_or_else(|| invalid_reference(s))?;
        let (book, cv) = match (ref_caps.get(1), ref_caps.get(2)) {
            (Some(book), Some(cv)) => (book.as_str().to_string(), cv.as_str()),
            _ => return Err(invalid_reference(s)),
        };
        let cv_caps = CV_RE.captures(cv).ok_or_else(|| invalid_reference(s))?;

        let verses = match (cv_caps.get(2), cv_caps.get(3)) {
            (None, None) => None,
            (Some(verse), None) => {
                let verse = parse_num_match(verse)?;
                Some(verse..=verse)
            }
            (Some(start), Some(end)) => Some(parse_num_match(start)?..=parse_num_match(end)?),
            (None, Some(_)) => return Err(invalid_reference(s)),
        };
        let chapter = cv_caps
            .get(1)
            .ok_or_else(|| invalid_reference(s))
            .and_then(parse_num_match)?;

        Ok(Reference {
            book,
            chapter,
            verses,
        })
    }
}

/// Parse a [Match](regex::Match) into an i32.
fn parse_num_match(m: Match) -> Result<i32, DbError> {
    m.as_str().parse().map_err(|_| DbError::InvalidReference {
        reference: m.as_str().to_string(),
    })
}

fn invalid_reference(s: &str) -> DbError {
    DbError::InvalidReference {
        reference: s.to_string(),
    }
}
