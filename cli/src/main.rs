use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::error;

use db::models::Reference;
use db::{ImportPolicy, Store, SwordDrill, SwordDrillable};

/// CLI for importing and reading Bible translations
#[derive(Parser)]
#[command(name = "biblers", version, author = "Dustin Speckhals <dustin1114@gmail.com>")]
struct Cli {
    /// SQLite database holding the imported translations
    #[arg(long, env = "DATABASE_URL", default_value = "biblers.db")]
    database: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a translation from a Bible XML file
    Import {
        file: PathBuf,

        /// Reject the file if any book, chapter or verse number is invalid
        #[arg(long)]
        strict: bool,
    },
    /// List the imported translations
    Translations,
    /// Show the books and chapters of a translation
    Nav { translation: i32 },
    /// Look up a chapter or verses, e.g. "John 3:16-18"
    Read {
        translation: i32,
        reference: String,
    },
}

fn print_json<T: serde::Serialize + ?Sized>(out: &mut impl Write, value: &T) -> io::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let store = Store::open(&cli.database)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Import { file, strict } => {
            let text = fs::read_to_string(&file)?;
            let policy = if strict {
                ImportPolicy::Strict
            } else {
                ImportPolicy::Lenient
            };
            let summary = store.import_document(&text, policy, |progress| {
                eprintln!("{progress}");
            })?;
            if cli.json {
                print_json(&mut out, &summary.translation_id)?;
            } else {
                writeln!(out, "{}", summary.translation_id)?;
            }
        }
        Command::Translations => {
            let translations = store.list_translations()?;
            if cli.json {
                print_json(&mut out, &translations)?;
            } else {
                for t in translations {
                    writeln!(out, "{}\t{}\t{}\t{}", t.id, t.name, t.status, t.link)?;
                }
            }
        }
        Command::Nav { translation } => {
            let nav = store.navigation(translation)?;
            if cli.json {
                print_json(&mut out, &nav)?;
            } else {
                for entry in nav {
                    let chapters: Vec<String> =
                        entry.chapters.iter().map(ToString::to_string).collect();
                    writeln!(
                        out,
                        "{}\t{}\t{}",
                        entry.book_number,
                        entry.book,
                        chapters.join(" ")
                    )?;
                }
            }
        }
        Command::Read {
            translation,
            reference,
        } => {
            let reference: Reference = reference.parse()?;
            let book = SwordDrill::book(translation, &reference.book, &mut *store.conn()?)?;
            let verses = match reference.verses.clone() {
                Some(range) => {
                    store.verses_by_range(translation, book.number, reference.chapter, range)?
                }
                None => store.verses_for_chapter(translation, book.number, reference.chapter)?,
            };

            if cli.json {
                print_json(&mut out, &verses)?;
            } else {
                writeln!(
                    out,
                    "{}",
                    Reference {
                        book: book.name,
                        ..reference
                    }
                )?;
                for v in verses {
                    writeln!(out, "{} {}", v.verse, v.words)?;
                }
            }
        }
    }

    Ok(())
}

fn main() {
    dotenv().ok();

    // Set up logging
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        error!("{e}");
        std::process::exit(1);
    }
}
