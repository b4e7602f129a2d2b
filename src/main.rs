use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use essaydb::db::models::{Book, EssayEntry, NewRecording};
use essaydb::db::Database;
use essaydb::ingest::markup::IndexFormat;
use essaydb::ingest::ImportOptions;
use essaydb::playback::{self, FileStatus, SystemLauncher};
use essaydb::query::{self, SearchResults, SearchScope};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "essaydb", version, about = "Spoken-word recording catalog")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scope {
    Titles,
    Numbers,
    Both,
}

impl Scope {
    fn search_scope(self) -> SearchScope {
        match self {
            Self::Titles => SearchScope::titles(),
            Self::Numbers => SearchScope::numbers(),
            Self::Both => SearchScope::default(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Table,
}

impl From<Format> for IndexFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Markdown => IndexFormat::Markdown,
            Format::Table => IndexFormat::Table,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List books in display order
    Books {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List a book's essays with their recordings
    Essays {
        /// Book title (exact), or id when no title matches
        book: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Search essay titles and numbers
    Search {
        /// Text to search for
        #[arg(required = true)]
        text: Vec<String>,

        /// Which essay fields to match
        #[arg(short, long, value_enum, default_value = "both")]
        scope: Scope,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Open a recording with the system's default player
    Play {
        /// Recording id (shown in brackets by `essays` and `search`)
        id: i64,
    },

    /// Import books and essays from a converted index document
    Import {
        /// Text file with one index entry per line
        path: PathBuf,

        /// Line layout of the file
        #[arg(long, value_enum, default_value = "markdown")]
        format: Format,

        /// Don't create placeholder recordings for new essays
        #[arg(long)]
        no_placeholders: bool,
    },

    /// Add a recording, creating its book and essay if needed
    AddRecording {
        /// Book title
        #[arg(long)]
        book: String,

        /// Essay number
        #[arg(long)]
        number: String,

        /// Essay title
        #[arg(long)]
        essay: String,

        /// Recording title (defaults to the essay title when displayed)
        #[arg(long)]
        title: Option<String>,

        /// Reciter name
        #[arg(long)]
        reciter: Option<String>,

        /// Recorded date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Duration (H:MM:SS)
        #[arg(long)]
        duration: Option<String>,

        /// Audio file path
        #[arg(long)]
        file: Option<String>,
    },

    /// Set a book's display order (lower sorts first)
    BookOrder {
        /// Book title (exact), or id when no title matches
        book: String,

        /// New display order
        #[arg(allow_negative_numbers = true)]
        order: i64,
    },

    /// List recordings that cannot be played (no file, or file missing)
    Missing,

    /// Show catalog statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = essaydb::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(essaydb::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path)
        .context("Failed to open database")?;

    match cli.command {
        Commands::Books { json } => {
            let books = db.list_books().context("Failed to load books")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
                return Ok(());
            }
            if books.is_empty() {
                println!("No books in the catalog. Import an index with `essaydb import`.");
                return Ok(());
            }
            print_books(&books);
        }

        Commands::Essays { book, json } => {
            let book = resolve_book(&db, &book)?;
            let entries = query::list_essays_with_recordings(&db, book.id)
                .context("Failed to load essays")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            println!("{}", book.title);
            println!();
            if entries.is_empty() {
                println!("No essays in this book.");
                return Ok(());
            }
            print_entries(&entries);
        }

        Commands::Search { text, scope, json } => {
            let text = text.join(" ");
            let results = query::search(&db, &text, scope.search_scope())
                .context("Search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            if results.is_empty() {
                println!("No results for '{}'.", results.query);
                return Ok(());
            }
            println!("{} results for '{}'", results.count, results.query);
            println!();
            print_search(&results);
        }

        Commands::Play { id } => {
            let (detail, path) = playback::play(&db, id, config.media_root.as_deref(), &SystemLauncher)
                .context("Playback failed")?;
            println!("Playing: {}", detail.label());
            println!("  {}", path.display());
        }

        Commands::Import { path, format, no_placeholders } => {
            let opts = ImportOptions {
                format: format.into(),
                placeholder_recordings: config.import.placeholder_recordings && !no_placeholders,
            };
            let s = essaydb::ingest::import_file(&db, &path, opts)
                .context("Import failed")?;
            println!(
                "Import complete: {} lines, {} books, {} new essays, {} existing, {} placeholders, {} orphaned",
                s.lines, s.books, s.essays_created, s.essays_existing, s.placeholders, s.orphaned
            );
            if s.orphaned > 0 {
                println!("({} essay lines appeared before any book heading and were skipped)", s.orphaned);
            }
        }

        Commands::AddRecording { book, number, essay, title, reciter, date, duration, file } => {
            if let Some(d) = &date {
                if chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() {
                    log::warn!("Date \"{}\" is not YYYY-MM-DD; recordings sort by date text", d);
                }
            }
            let new = NewRecording {
                title,
                reciter,
                recorded_date: date,
                duration,
                file_path: file,
            };
            let (essay_id, recording_id) = db
                .transaction(|db| -> essaydb::db::Result<(i64, i64)> {
                    let book_id = db.find_or_create_book(&book)?;
                    let essay_id = db.find_or_create_essay(book_id, &essay, &number)?;
                    let recording_id = db.add_recording(essay_id, &new)?;
                    Ok((essay_id, recording_id))
                })
                .context("Failed to add recording")?;
            println!("Added recording {} to essay {} (id {})", recording_id, number, essay_id);
        }

        Commands::BookOrder { book, order } => {
            let book = resolve_book(&db, &book)?;
            db.set_book_display_order(book.id, order)
                .context("Failed to update book")?;
            println!("{}: display order {} -> {}", book.title, book.display_order, order);
        }

        Commands::Missing => {
            let rows = db.unplayable_candidates().context("Failed to load recordings")?;
            let media_root = config.media_root.as_deref();
            let mut missing = 0usize;

            for r in &rows {
                let status = playback::file_status(r.file_path.as_deref(), media_root);
                if matches!(status, FileStatus::Playable(_)) {
                    continue;
                }
                if missing == 0 {
                    println!("{:>6}  {:<8} {:<30} {:<8} {}", "Id", "Status", "Book", "#", "Essay");
                    println!("{}", "-".repeat(90));
                }
                missing += 1;
                println!(
                    "{:>6}  {:<8} {:<30} {:<8} {}",
                    r.recording_id,
                    status.label(),
                    truncate(&r.book_title, 30),
                    truncate(&r.essay_number, 8),
                    truncate(&essaydb::db::models::collapse_whitespace(&r.essay_title), 40),
                );
            }

            if missing == 0 {
                println!("All {} recordings have a playable file.", rows.len());
            } else {
                println!();
                println!("{} of {} recordings cannot be played.", missing, rows.len());
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Catalog Statistics");
            println!("==================");
            println!("Books:              {}", stats.books);
            println!("Essays:             {}", stats.essays);
            println!("  without recording {}", stats.essays_without_recordings);
            println!("Recordings:         {}", stats.recordings);
            println!("  with a file       {}", stats.recordings_with_file);
        }
    }

    Ok(())
}

fn resolve_book(db: &Database, arg: &str) -> Result<Book> {
    db.find_book(arg)
        .context("Failed to look up book")?
        .ok_or_else(|| anyhow::anyhow!("No book matching \"{}\"", arg))
}

/// Truncate to `max` characters, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn print_books(books: &[Book]) {
    println!("{:>5}  {:>5}  {}", "Id", "Order", "Title");
    println!("{}", "-".repeat(60));
    for b in books {
        println!("{:>5}  {:>5}  {}", b.id, b.display_order, b.title);
    }
}

/// Print essays as parents with their recordings indented underneath.
fn print_entries<'a>(entries: impl IntoIterator<Item = &'a EssayEntry>) {
    println!("{:<8} {:<50} {:>9} {:>6}", "#", "Title / Reciter", "Duration", "Id");
    println!("{}", "-".repeat(76));

    for e in entries {
        println!("{:<8} {}", truncate(&e.essay.essay_number, 8), truncate(&e.display_title, 60));
        if e.recordings.is_empty() {
            println!("{:<8}   {}", "", "No recordings available");
            continue;
        }
        for r in &e.recordings {
            println!(
                "{:<8}   {:<48} {:>9} {:>6}",
                "",
                truncate(&r.reciter_label(), 48),
                r.duration,
                format!("[{}]", r.id),
            );
        }
    }
}

fn print_search(results: &SearchResults) {
    for (book, entries) in results.groups() {
        println!("== {} ==", book.title);
        print_entries(entries);
        println!();
    }
}
