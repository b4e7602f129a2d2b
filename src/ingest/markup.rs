use regex::Regex;
use std::sync::LazyLock;

/// What a single line of a converted index document says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLine {
    /// A book heading: subsequent essays belong to this title.
    Book(String),
    /// An essay entry. `numbers` holds one element per essay row to create.
    Essay { numbers: Vec<String>, title: String },
    /// Blank, decorative or unrecognised.
    Other,
}

/// Layout of the index text being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// Markdown-style markers: `*[Book Title]*` and `**349, 350** Essay Title`.
    #[default]
    Markdown,
    /// Tab-separated table rows: `<numbers>\t<title>`; a first cell that does
    /// not start with a digit marks a book row whose title is in cell two.
    Table,
}

// Book heading anywhere in the line: *[The Aletheon]* or *[The Aletheon]{.smallcaps}*
static BOOK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\[([^\]]+)\](?:\{\.\w+\})?\*").unwrap());

// Essay entry: **349** Acausal Adidam, **349, 350** Title
static ESSAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*\s+(.*)").unwrap());

// Bracketed span with a class suffix: [Title].smallcaps
static CLASSED_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\.\w+").unwrap());

// Attribute blocks: {.smallcaps}, {.underline}
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\.\w+\}").unwrap());

impl IndexFormat {
    pub fn classify(self, line: &str) -> IndexLine {
        match self {
            Self::Markdown => classify_markdown(line),
            Self::Table => classify_table_row(line),
        }
    }
}

pub fn classify_markdown(line: &str) -> IndexLine {
    let line = line.trim();
    if line.is_empty() {
        return IndexLine::Other;
    }

    if let Some(caps) = BOOK_RE.captures(line) {
        let title = clean_title(&caps[1]);
        if !title.is_empty() {
            return IndexLine::Book(title);
        }
        return IndexLine::Other;
    }

    if let Some(caps) = ESSAY_RE.captures(line) {
        return essay_line(&caps[1], &caps[2]);
    }

    IndexLine::Other
}

pub fn classify_table_row(line: &str) -> IndexLine {
    let mut cells = line.split('\t').map(str::trim);
    let (Some(first), Some(second)) = (cells.next(), cells.next()) else {
        return IndexLine::Other;
    };
    if first.is_empty() || second.is_empty() {
        return IndexLine::Other;
    }

    if first.starts_with(|c: char| c.is_ascii_digit()) {
        essay_line(first, second)
    } else {
        let title = clean_title(second);
        if title.is_empty() { IndexLine::Other } else { IndexLine::Book(title) }
    }
}

fn essay_line(numbers: &str, title: &str) -> IndexLine {
    let numbers = split_numbers(numbers);
    let title = clean_title(title);
    if numbers.is_empty() || title.is_empty() {
        return IndexLine::Other;
    }
    IndexLine::Essay { numbers, title }
}

/// "349, 350" → ["349", "350"]; empty pieces are dropped.
pub fn split_numbers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}

/// Strip conversion markup from a title and normalise non-breaking spaces.
pub fn clean_title(raw: &str) -> String {
    let t = CLASSED_SPAN_RE.replace_all(raw, "$1");
    let t = ATTRIBUTE_RE.replace_all(&t, "");
    t.replace(['[', ']'], "")
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}
