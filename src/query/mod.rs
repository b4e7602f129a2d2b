//! Read-side composition over the catalog: essay listings for a book and the
//! free-text essay search. Every call re-reads storage; nothing is cached.

pub mod builder;

use std::cmp::Ordering;
use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Book, Essay, EssayEntry, Recording, RecordingView};
use crate::db::queries::recording_from_row;
use crate::db::{Database, StorageError};
use builder::{EssayFilter, Predicate};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidQuery {
    #[error("search text is empty")]
    EmptyText,
    #[error("no search scope selected (titles and numbers are both off)")]
    NoScope,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] InvalidQuery),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Which essay fields a search matches against. Both on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchScope {
    pub match_titles: bool,
    pub match_numbers: bool,
}

impl Default for SearchScope {
    fn default() -> Self {
        Self {
            match_titles: true,
            match_numbers: true,
        }
    }
}

impl SearchScope {
    pub fn titles() -> Self {
        Self { match_titles: true, match_numbers: false }
    }

    pub fn numbers() -> Self {
        Self { match_titles: false, match_numbers: true }
    }
}

/// One matching essay with its owning book.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub book: Book,
    #[serde(flatten)]
    pub entry: EssayEntry,
}

/// Search output. `count == 0` is a successful "no results", distinct from
/// any error.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub count: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Hits grouped by owning book, in result order.
    pub fn groups(&self) -> Vec<(&Book, Vec<&EssayEntry>)> {
        let mut groups: Vec<(&Book, Vec<&EssayEntry>)> = Vec::new();
        for hit in &self.hits {
            match groups.last_mut() {
                Some((book, entries)) if book.id == hit.book.id => entries.push(&hit.entry),
                _ => groups.push((&hit.book, vec![&hit.entry])),
            }
        }
        groups
    }
}

/// Sort position derived from an essay number. Numbers starting with a digit
/// sort by the value of their leading digit run; everything else sorts after
/// all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumberKey {
    Numeric(u64),
    NonNumeric,
}

pub fn number_key(essay_number: &str) -> NumberKey {
    let digits: Vec<u64> = essay_number
        .chars()
        .map_while(|c| c.to_digit(10))
        .map(u64::from)
        .collect();
    if digits.is_empty() {
        return NumberKey::NonNumeric;
    }
    let value = digits
        .iter()
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(*d));
    NumberKey::Numeric(value)
}

/// Essay order: number key, then display order, then title (byte-wise).
pub fn essay_order(a: &Essay, b: &Essay) -> Ordering {
    number_key(&a.essay_number)
        .cmp(&number_key(&b.essay_number))
        .then(a.display_order.cmp(&b.display_order))
        .then_with(|| a.title.cmp(&b.title))
        .then(a.id.cmp(&b.id))
}

/// Every essay of a book with its recordings, in listing order.
pub fn list_essays_with_recordings(db: &Database, book_id: i64) -> Result<Vec<EssayEntry>> {
    let loaded = db.snapshot(|conn| {
        if db.get_book(book_id)?.is_none() {
            return Ok(None);
        }
        let params = vec![Value::Integer(book_id)];
        let rows = load_essays(conn, "e.book_id = ?", &params)?;
        let recordings = load_recordings(conn, "e.book_id = ?", &params)?;
        Ok(Some((rows, recordings)))
    })?;

    let (rows, mut recordings) = loaded.ok_or(QueryError::NotFound { entity: "book", id: book_id })?;
    let mut essays: Vec<Essay> = rows.into_iter().map(|(_, essay)| essay).collect();
    essays.sort_by(essay_order);

    Ok(essays
        .into_iter()
        .map(|essay| {
            let recs = recordings.remove(&essay.id).unwrap_or_default();
            entry_for(essay, recs)
        })
        .collect())
}

/// Free-text search over essay titles and/or numbers.
pub fn search(db: &Database, text: &str, scope: SearchScope) -> Result<SearchResults> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InvalidQuery::EmptyText.into());
    }
    if !scope.match_titles && !scope.match_numbers {
        return Err(InvalidQuery::NoScope.into());
    }

    let mut filter = EssayFilter::new();
    if scope.match_titles {
        filter = filter.or(Predicate::TitleContains(text.to_string()));
    }
    if scope.match_numbers {
        filter = filter.or(Predicate::NumberContains(text.to_string()));
    }

    let clause = filter.where_clause();
    let params = filter.params();
    let (mut rows, mut recordings) = db.snapshot(|conn| {
        let rows = load_essays(conn, &clause, &params)?;
        let recordings = load_recordings(conn, &clause, &params)?;
        Ok((rows, recordings))
    })?;

    rows.sort_by(|(ba, ea), (bb, eb)| {
        ba.title
            .cmp(&bb.title)
            .then(ba.id.cmp(&bb.id))
            .then_with(|| essay_order(ea, eb))
    });

    let hits: Vec<SearchHit> = rows
        .into_iter()
        .map(|(book, essay)| {
            let recs = recordings.remove(&essay.id).unwrap_or_default();
            SearchHit { book, entry: entry_for(essay, recs) }
        })
        .collect();

    log::debug!("Search \"{}\" matched {} essays", text, hits.len());

    Ok(SearchResults {
        query: text.to_string(),
        count: hits.len(),
        hits,
    })
}

fn entry_for(essay: Essay, recordings: Vec<Recording>) -> EssayEntry {
    let display_title = essay.display_title();
    let recordings = recordings
        .into_iter()
        .map(|r| RecordingView::from_recording(r, &display_title))
        .collect();
    EssayEntry { essay, display_title, recordings }
}

/// Essays (with their book) matching `condition` over `essays e`.
fn load_essays(
    conn: &Connection,
    condition: &str,
    params: &[Value],
) -> crate::db::Result<Vec<(Book, Essay)>> {
    let sql = format!(
        "SELECT b.id, b.title, b.display_order,
                e.id, e.book_id, e.essay_number, e.title, e.display_order
         FROM essays e
         JOIN books b ON b.id = e.book_id
         WHERE {condition}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok((
                Book {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    display_order: row.get(2)?,
                },
                Essay {
                    id: row.get(3)?,
                    book_id: row.get(4)?,
                    essay_number: row.get(5)?,
                    title: row.get(6)?,
                    display_order: row.get(7)?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recordings of essays matching `condition`, keyed by essay id. Each list is
/// ordered by reciter (NULL first), then recorded date.
fn load_recordings(
    conn: &Connection,
    condition: &str,
    params: &[Value],
) -> crate::db::Result<HashMap<i64, Vec<Recording>>> {
    let sql = format!(
        "SELECT r.id, r.essay_id, r.title, r.reciter, r.recorded_date, r.duration, r.file_path
         FROM recordings r
         JOIN essays e ON e.id = r.essay_id
         WHERE {condition}
         ORDER BY r.reciter, r.recorded_date, r.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut by_essay: HashMap<i64, Vec<Recording>> = HashMap::new();
    let rows = stmt.query_map(params_from_iter(params.iter()), recording_from_row)?;
    for rec in rows {
        let rec = rec?;
        by_essay.entry(rec.essay_id).or_default().push(rec);
    }
    Ok(by_essay)
}
