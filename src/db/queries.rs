use super::models::{Book, CatalogStats, FileCheckRow, NewRecording, Recording, RecordingDetail};
use super::{Database, Result, StorageError};
use rusqlite::{OptionalExtension, Row, params};

impl Database {
    /// Exact, case-sensitive title lookup; inserts with display order 0 when
    /// absent. Returns the book id either way. Blank titles are rejected.
    pub fn find_or_create_book(&self, title: &str) -> Result<i64> {
        if title.trim().is_empty() {
            return Err(StorageError::EmptyTitle("Book"));
        }
        self.atomically(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM books WHERE title = ?1 ORDER BY id LIMIT 1",
                    params![title],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                log::debug!("Found book: {} (id {})", title, id);
                return Ok(id);
            }

            conn.execute(
                "INSERT INTO books (title, display_order) VALUES (?1, 0)",
                params![title],
            )?;
            let id = conn.last_insert_rowid();
            log::debug!("Added book: {} (id {})", title, id);
            Ok(id)
        })
    }

    /// Look up an essay by its natural key (book, title, number).
    pub fn find_essay(&self, book_id: i64, title: &str, essay_number: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM essays
                 WHERE book_id = ?1 AND title = ?2 AND essay_number = ?3
                 ORDER BY id LIMIT 1",
                params![book_id, title, essay_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Exact match on (book, title, number); inserts with display order 0
    /// when absent. The number may be blank, the title may not.
    pub fn find_or_create_essay(&self, book_id: i64, title: &str, essay_number: &str) -> Result<i64> {
        if title.trim().is_empty() {
            return Err(StorageError::EmptyTitle("Essay"));
        }
        self.atomically(|conn| {
            if let Some(id) = self.find_essay(book_id, title, essay_number)? {
                return Ok(id);
            }
            conn.execute(
                "INSERT INTO essays (book_id, essay_number, title, display_order)
                 VALUES (?1, ?2, ?3, 0)",
                params![book_id, essay_number, title],
            )?;
            let id = conn.last_insert_rowid();
            log::debug!("Added essay {} \"{}\" (id {})", essay_number, title, id);
            Ok(id)
        })
    }

    /// Unconditional insert. Re-adding the same fields creates a second row.
    pub fn add_recording(&self, essay_id: i64, r: &NewRecording) -> Result<i64> {
        self.atomically(|conn| {
            conn.execute(
                "INSERT INTO recordings (
                    essay_id, title, reciter, recorded_date, duration, file_path, date_added
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
                params![
                    essay_id, r.title, r.reciter, r.recorded_date, r.duration, r.file_path,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Every book ordered by (display order, title).
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, display_order FROM books
             ORDER BY display_order, title, id",
        )?;

        let books = stmt
            .query_map([], book_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                "SELECT id, title, display_order FROM books WHERE id = ?1",
                params![id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    pub fn find_book_by_title(&self, title: &str) -> Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                "SELECT id, title, display_order FROM books
                 WHERE title = ?1 ORDER BY id LIMIT 1",
                params![title],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    /// Resolve a user-supplied book reference: exact title first, then id.
    /// A book titled "1984" wins over the book whose id is 1984.
    pub fn find_book(&self, key: &str) -> Result<Option<Book>> {
        if let Some(book) = self.find_book_by_title(key)? {
            return Ok(Some(book));
        }
        match key.trim().parse::<i64>() {
            Ok(id) => self.get_book(id),
            Err(_) => Ok(None),
        }
    }

    /// Set a book's display order. Returns false when no such book exists.
    pub fn set_book_display_order(&self, book_id: i64, display_order: i64) -> Result<bool> {
        self.atomically(|conn| {
            let updated = conn.execute(
                "UPDATE books SET display_order = ?1 WHERE id = ?2",
                params![display_order, book_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// A recording with the titles of its essay and book.
    pub fn get_recording(&self, id: i64) -> Result<Option<RecordingDetail>> {
        let detail = self
            .conn
            .query_row(
                "SELECT r.id, r.essay_id, r.title, r.reciter, r.recorded_date,
                        r.duration, r.file_path,
                        e.essay_number, e.title, b.title
                 FROM recordings r
                 JOIN essays e ON e.id = r.essay_id
                 JOIN books b ON b.id = e.book_id
                 WHERE r.id = ?1",
                params![id],
                |row| {
                    Ok(RecordingDetail {
                        recording: recording_from_row(row)?,
                        essay_number: row.get(7)?,
                        essay_title: row.get(8)?,
                        book_title: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }

    /// Every recording with its file path, in catalog order. The caller decides
    /// which ones cannot be played.
    pub fn unplayable_candidates(&self) -> Result<Vec<FileCheckRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, b.title, e.essay_number, e.title, r.reciter, r.file_path
             FROM recordings r
             JOIN essays e ON e.id = r.essay_id
             JOIN books b ON b.id = e.book_id
             ORDER BY b.display_order, b.title, e.id, r.id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(FileCheckRow {
                    recording_id: row.get(0)?,
                    book_title: row.get(1)?,
                    essay_number: row.get(2)?,
                    essay_title: row.get(3)?,
                    reciter: row.get(4)?,
                    file_path: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Get catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats> {
        self.snapshot(|conn| {
            let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

            Ok(CatalogStats {
                books: count("SELECT COUNT(*) FROM books")?,
                essays: count("SELECT COUNT(*) FROM essays")?,
                recordings: count("SELECT COUNT(*) FROM recordings")?,
                recordings_with_file: count(
                    "SELECT COUNT(*) FROM recordings
                     WHERE file_path IS NOT NULL AND file_path != ''",
                )?,
                essays_without_recordings: count(
                    "SELECT COUNT(*) FROM essays e
                     WHERE NOT EXISTS (SELECT 1 FROM recordings r WHERE r.essay_id = e.id)",
                )?,
            })
        })
    }
}

pub(crate) fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        display_order: row.get(2)?,
    })
}

/// Reads the seven recording columns starting at index 0.
pub(crate) fn recording_from_row(row: &Row<'_>) -> rusqlite::Result<Recording> {
    Ok(Recording {
        id: row.get(0)?,
        essay_id: row.get(1)?,
        title: row.get(2)?,
        reciter: row.get(3)?,
        recorded_date: row.get(4)?,
        duration: row.get(5)?,
        file_path: row.get(6)?,
    })
}
