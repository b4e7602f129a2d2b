pub mod markup;

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::db::models::NewRecording;
use crate::db::{Database, StorageError};
use markup::{IndexFormat, IndexLine};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Database error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub format: IndexFormat,
    /// Add a file-less "Recording of <title>" row for every new essay.
    pub placeholder_recordings: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: IndexFormat::Markdown,
            placeholder_recordings: true,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Book headings seen (new or existing).
    pub books: u64,
    pub essays_created: u64,
    pub essays_existing: u64,
    pub placeholders: u64,
    /// Essay lines that appeared before any book heading.
    pub orphaned: u64,
}

/// Accumulator threaded through the fold over index lines.
#[derive(Debug, Default)]
struct ImportState {
    current_book: Option<i64>,
    summary: ImportSummary,
}

/// Import an index file. The whole file lands in one transaction or not at all.
pub fn import_file(db: &Database, path: &Path, opts: ImportOptions) -> Result<ImportSummary, ImportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Importing {} ({:?} format)", path.display(), opts.format);
    import_text(db, &text, opts)
}

pub fn import_text(db: &Database, text: &str, opts: ImportOptions) -> Result<ImportSummary, ImportError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let pb = ProgressBar::new(lines.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Importing...");

    let state = db.transaction(|db| {
        lines.iter().try_fold(ImportState::default(), |mut state, line| {
            state.summary.lines += 1;
            pb.inc(1);
            step(db, state, opts.format.classify(line), opts)
        })
    });

    let state = match state {
        Ok(state) => state,
        Err(e) => {
            pb.abandon_with_message("Import rolled back");
            return Err(e.into());
        }
    };

    let s = &state.summary;
    pb.finish_with_message(format!(
        "Done: {} books, {} new essays, {} existing, {} orphaned",
        s.books, s.essays_created, s.essays_existing, s.orphaned
    ));

    Ok(state.summary)
}

/// Apply one classified line to the catalog, returning the updated state.
fn step(
    db: &Database,
    mut state: ImportState,
    line: IndexLine,
    opts: ImportOptions,
) -> Result<ImportState, StorageError> {
    match line {
        IndexLine::Other => {}

        IndexLine::Book(title) => {
            let id = db.find_or_create_book(&title)?;
            state.summary.books += 1;
            state.current_book = Some(id);
        }

        IndexLine::Essay { numbers, title } => {
            let Some(book_id) = state.current_book else {
                log::warn!("Essay {} \"{}\" appears before any book heading, skipped", numbers.join(", "), title);
                state.summary.orphaned += 1;
                return Ok(state);
            };

            for number in &numbers {
                if db.find_essay(book_id, &title, number)?.is_some() {
                    state.summary.essays_existing += 1;
                    continue;
                }

                let essay_id = db.find_or_create_essay(book_id, &title, number)?;
                state.summary.essays_created += 1;

                if opts.placeholder_recordings {
                    let placeholder = NewRecording {
                        title: Some(format!("Recording of {title}")),
                        ..Default::default()
                    };
                    db.add_recording(essay_id, &placeholder)?;
                    state.summary.placeholders += 1;
                }
            }
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{self, SearchScope};

    const INDEX: &str = "\
Essays of the Heart: index

*[The Aletheon]{.smallcaps}*
**349, 350** Acausal Adidam
**12** [The Heart]{.underline} of Understanding

*[Not-Two Is Peace]*
**1** The Perfect Practice
";

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_import_markdown_index() {
        let db = Database::open_in_memory().unwrap();
        let summary = import_text(&db, INDEX, ImportOptions::default()).unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                lines: 6,
                books: 2,
                essays_created: 4,
                essays_existing: 0,
                placeholders: 4,
                orphaned: 0,
            }
        );

        let books = db.list_books().unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, ["Not-Two Is Peace", "The Aletheon"]);

        let aletheon = db.find_book_by_title("The Aletheon").unwrap().unwrap();
        let entries = query::list_essays_with_recordings(&db, aletheon.id).unwrap();
        let numbers: Vec<&str> = entries.iter().map(|e| e.essay.essay_number.as_str()).collect();
        assert_eq!(numbers, ["12", "349", "350"]);
        assert_eq!(entries[1].display_title, entries[2].display_title);
        assert_eq!(entries[0].recordings[0].title, "Recording of The Heart of Understanding");
        assert_eq!(entries[0].recordings[0].file_path, None);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        import_text(&db, INDEX, ImportOptions::default()).unwrap();
        let second = import_text(&db, INDEX, ImportOptions::default()).unwrap();

        assert_eq!(second.essays_created, 0);
        assert_eq!(second.essays_existing, 4);
        assert_eq!(second.placeholders, 0);
        assert_eq!(count(&db, "books"), 2);
        assert_eq!(count(&db, "essays"), 4);
        assert_eq!(count(&db, "recordings"), 4);
    }

    #[test]
    fn test_essays_before_any_book_are_orphaned() {
        let db = Database::open_in_memory().unwrap();
        let text = "**1** Lost Essay\n*[Book]*\n**2** Found Essay\n";
        let summary = import_text(&db, text, ImportOptions::default()).unwrap();

        assert_eq!(summary.orphaned, 1);
        assert_eq!(summary.essays_created, 1);
        let results = query::search(&db, "Lost", SearchScope::titles()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_book_context_does_not_leak_between_imports() {
        let db = Database::open_in_memory().unwrap();
        import_text(&db, "*[First]*\n**1** One\n", ImportOptions::default()).unwrap();
        let summary = import_text(&db, "**2** Two\n", ImportOptions::default()).unwrap();
        assert_eq!(summary.orphaned, 1);
        assert_eq!(count(&db, "essays"), 1);
    }

    #[test]
    fn test_import_without_placeholders() {
        let db = Database::open_in_memory().unwrap();
        let opts = ImportOptions { placeholder_recordings: false, ..Default::default() };
        let summary = import_text(&db, INDEX, opts).unwrap();
        assert_eq!(summary.placeholders, 0);
        assert_eq!(count(&db, "recordings"), 0);

        let results = query::search(&db, "Adidam", SearchScope::titles()).unwrap();
        assert_eq!(results.count, 2);
        assert!(results.hits.iter().all(|h| h.entry.recordings.is_empty()));
    }

    #[test]
    fn test_import_table_format() {
        let db = Database::open_in_memory().unwrap();
        let text = "Book\tThe Aletheon\n349, 350\tAcausal\u{a0}Adidam\nnote\n7\tLight\n";
        let opts = ImportOptions { format: IndexFormat::Table, ..Default::default() };
        let summary = import_text(&db, text, opts).unwrap();
        assert_eq!(summary.books, 1);
        assert_eq!(summary.essays_created, 3);

        let results = query::search(&db, "Acausal Adidam", SearchScope::titles()).unwrap();
        assert_eq!(results.count, 2);
    }

    #[test]
    fn test_failed_import_leaves_nothing_behind() {
        let db = Database::open_in_memory().unwrap();
        db.conn.execute_batch("DROP TABLE recordings").unwrap();

        let err = import_text(&db, INDEX, ImportOptions::default()).unwrap_err();
        assert!(matches!(err, ImportError::Storage(_)));
        assert_eq!(count(&db, "books"), 0);
        assert_eq!(count(&db, "essays"), 0);
        assert!(db.conn.is_autocommit());
    }

    #[test]
    fn test_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.md");
        std::fs::write(&path, INDEX).unwrap();

        let db = Database::open_in_memory().unwrap();
        let summary = import_file(&db, &path, ImportOptions::default()).unwrap();
        assert_eq!(summary.essays_created, 4);

        let missing = dir.path().join("missing.md");
        let err = import_file(&db, &missing, ImportOptions::default()).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
