use serde::Serialize;

/// Shown in place of a missing reciter.
pub const UNKNOWN_RECITER: &str = "Unknown";

/// Shown in place of a missing duration.
pub const MISSING_DURATION: &str = "--:--";

/// A top-level catalog grouping (a published work).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub display_order: i64,
}

/// A numbered talk or chapter within a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Essay {
    pub id: i64,
    pub book_id: i64,
    /// Free-form: "349", "12a", "IV" or empty.
    pub essay_number: String,
    /// Raw title as imported; may carry newlines from table cells.
    pub title: String,
    pub display_order: i64,
}

impl Essay {
    /// Title with whitespace runs collapsed, for display.
    pub fn display_title(&self) -> String {
        collapse_whitespace(&self.title)
    }
}

/// A recording row read from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub id: i64,
    pub essay_id: i64,
    pub title: Option<String>,
    pub reciter: Option<String>,
    /// Stored as YYYY-MM-DD text when known.
    pub recorded_date: Option<String>,
    /// Stored as H:MM:SS text when known.
    pub duration: Option<String>,
    pub file_path: Option<String>,
}

/// Fields for inserting a recording. Everything is optional: a row with no
/// file path is a placeholder for a recording not yet digitized.
#[derive(Debug, Clone, Default)]
pub struct NewRecording {
    pub title: Option<String>,
    pub reciter: Option<String>,
    pub recorded_date: Option<String>,
    pub duration: Option<String>,
    pub file_path: Option<String>,
}

/// A recording joined with the essay and book it belongs to.
#[derive(Debug, Clone)]
pub struct RecordingDetail {
    pub recording: Recording,
    pub essay_number: String,
    pub essay_title: String,
    pub book_title: String,
}

impl RecordingDetail {
    /// One-line label: "Book - 12 - Essay Title - Reciter".
    pub fn label(&self) -> String {
        format!(
            "{} - {} - {} - {}",
            self.book_title,
            self.essay_number,
            collapse_whitespace(&self.essay_title),
            self.recording.reciter.as_deref().unwrap_or(UNKNOWN_RECITER),
        )
    }
}

/// Consumer-facing projection of a recording with display fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingView {
    pub id: i64,
    /// Recording title, or the essay's display title when absent.
    pub title: String,
    /// Reciter, or "Unknown".
    pub reciter: String,
    pub recorded_date: Option<String>,
    /// Duration, or "--:--".
    pub duration: String,
    pub file_path: Option<String>,
}

impl RecordingView {
    pub fn from_recording(r: Recording, essay_display_title: &str) -> Self {
        Self {
            id: r.id,
            title: r
                .title
                .map(|t| collapse_whitespace(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| essay_display_title.to_string()),
            reciter: r.reciter.unwrap_or_else(|| UNKNOWN_RECITER.to_string()),
            recorded_date: r.recorded_date,
            duration: r.duration.unwrap_or_else(|| MISSING_DURATION.to_string()),
            file_path: r.file_path,
        }
    }

    /// "Reciter (date)" or just "Reciter".
    pub fn reciter_label(&self) -> String {
        match self.recorded_date.as_deref() {
            Some(d) if !d.is_empty() => format!("{} ({})", self.reciter, d),
            _ => self.reciter.clone(),
        }
    }
}

/// An essay with its ordered recordings. The list is empty, never missing,
/// when nothing has been recorded yet.
#[derive(Debug, Clone, Serialize)]
pub struct EssayEntry {
    pub essay: Essay,
    pub display_title: String,
    pub recordings: Vec<RecordingView>,
}

/// A recording whose file is missing or unset.
#[derive(Debug, Clone)]
pub struct FileCheckRow {
    pub recording_id: i64,
    pub book_title: String,
    pub essay_number: String,
    pub essay_title: String,
    pub reciter: Option<String>,
    pub file_path: Option<String>,
}

/// Catalog statistics.
#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub books: i64,
    pub essays: i64,
    pub recordings: i64,
    pub recordings_with_file: i64,
    pub essays_without_recordings: i64,
}

/// Collapse every whitespace run (newlines included) to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
