use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use serde_json::json;

use skybook::naming::{default_author, default_output_name, default_title};
use skybook::{build_book, ArticleInput, ArticleRecord, BookOptions, PipelineOptions, StreamingZip};

#[derive(Parser)]
#[command(name = "skybook")]
#[command(about = "Assemble an EPUB book with a mosaic cover from extracted articles")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an EPUB from a JSON array of articles
    ///
    /// Each article is an object with `url`, `title`, `body` and optional
    /// `thumbnail` (local image path), `author` and `published` fields.
    Build {
        /// JSON file with the articles, in reading order
        articles: PathBuf,
        /// Account handle or profile URL the articles came from
        #[arg(long, short)]
        account: Option<String>,
        /// Book title (default: "<account> - BlueSky Book")
        #[arg(long, short)]
        title: Option<String>,
        /// Book author (default: "@<account>")
        #[arg(long)]
        author: Option<String>,
        /// Output file (default: "<account>-<timestamp>.epub")
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the entries of an EPUB archive
    Inspect {
        /// EPUB file
        epub: PathBuf,
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = match init_logging(cli.verbose) {
        Ok(handle) => handle,
        Err(msg) => {
            eprintln!("error: {}", msg);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the flag-derived level.
fn init_logging(verbose: bool) -> Result<LoggerHandle, String> {
    let level = if verbose { "debug" } else { "info" };
    Logger::try_with_env_or_str(level)
        .map_err(|err| format!("invalid log specification: {err}"))?
        .log_to_stderr()
        .format(flexi_logger::colored_default_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Build {
            articles,
            account,
            title,
            author,
            output,
        } => cmd_build(&articles, account, title, author, output),
        Command::Inspect { epub, pretty } => cmd_inspect(&epub, pretty),
    }
}

fn display_err<E: std::fmt::Display>(err: E) -> String {
    err.to_string()
}

fn load_records(path: &Path) -> Result<Vec<ArticleRecord>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {}", path.display(), err))?;
    let inputs: Vec<ArticleInput> = serde_json::from_str(&text)
        .map_err(|err| format!("invalid article file {}: {}", path.display(), err))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(inputs
        .into_iter()
        .map(|input| input.into_record(base_dir))
        .collect())
}

fn cmd_build(
    articles: &Path,
    account: Option<String>,
    title: Option<String>,
    author: Option<String>,
    output: Option<PathBuf>,
) -> Result<(), String> {
    let records = load_records(articles)?;
    let now = Local::now();

    let mut book = BookOptions::default().with_created(now.naive_local());
    if let Some(account) = account.as_deref() {
        book = book
            .with_title(default_title(account))
            .with_author(default_author(account));
    }
    if let Some(title) = title {
        book = book.with_title(title);
    }
    if let Some(author) = author {
        book = book.with_author(author);
    }
    let output = output.unwrap_or_else(|| {
        PathBuf::from(default_output_name(
            account.as_deref().unwrap_or("skybook"),
            &now,
        ))
    });

    let report = build_book(&records, &PipelineOptions::new(book), &output).map_err(display_err)?;

    println!("Wrote {}", report.output.display());
    println!(
        "  {} articles, cover from {} thumbnails",
        report.articles.len(),
        report.tiles_used
    );
    for failure in &report.skipped {
        println!("  skipped {}", failure);
    }
    for failure in &report.tile_failures {
        println!("  no thumbnail for {}: {}", failure.url, failure.error);
    }
    Ok(())
}

fn cmd_inspect(path: &Path, pretty: bool) -> Result<(), String> {
    let file = File::open(path).map_err(|err| format!("cannot open {}: {}", path.display(), err))?;
    let mut zip = StreamingZip::new(file).map_err(display_err)?;
    let entries: Vec<serde_json::Value> = zip
        .entries()
        .map(|entry| {
            json!({
                "name": entry.filename,
                "method": if entry.is_stored() { "stored" } else { "deflated" },
                "compressed_size": entry.compressed_size,
                "uncompressed_size": entry.uncompressed_size,
            })
        })
        .collect();
    let mimetype = match zip.validate_mimetype() {
        Ok(()) => json!({ "ok": true }),
        Err(err) => json!({ "ok": false, "error": err.to_string() }),
    };
    let output = json!({
        "epub": path.display().to_string(),
        "count": entries.len(),
        "mimetype": mimetype,
        "entries": entries,
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(display_err)?;
    println!("{}", rendered);
    Ok(())
}
