use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use shelf_catalog::backup::BackupOutcome;
use shelf_catalog::{Book, Collection, CopySlot, EditableField, FieldName};
use shelf_config::Config;
use shelf_library::Library;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open library")]
    Open,
    #[display("command failed")]
    Command,
    #[display("invalid input")]
    Input,
}

/// Catalog a personal e-book collection.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON) layered over the defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log more; repeat for even more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report which EPUB files in a directory are new or missing.
    Scan { dir: PathBuf },
    /// Import every EPUB file in a directory.
    Import {
        dir: PathBuf,
        /// The files are retail copies.
        #[arg(long)]
        retail: bool,
    },
    /// Drop vanished copies and move files onto their canonical paths.
    Refresh,
    /// List every book.
    List,
    /// Find books matching every word of the query.
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Change one field of a book; an empty value clears optional fields.
    Edit { id: u64, field: String, value: String },
    /// Mark a copy to be replaced by the next import for its slot.
    Flag {
        id: u64,
        #[arg(long)]
        retail: bool,
    },
    /// Delete a book and its files.
    Remove { id: u64 },
    /// Rebuild the search index from the catalog.
    RebuildIndex,
    /// Commit the catalog to the backup repository.
    Backup,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_book(book: &Book) {
    let slots: Vec<String> = book.copies().map(|(slot, copy)| format!("{slot}: {}", copy.path.display())).collect();
    println!("#{} {} by {} [{}] ({})", book.id, book.metadata.title, book.metadata.author_display(), book.progress, slots.join(", "));
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let mut library = Library::open(config).await.or_raise(|| ErrorKind::Open)?;
    match cli.command {
        Command::Scan { dir } => {
            let candidates = library.scan(&dir).await.or_raise(|| ErrorKind::Command)?;
            for candidate in candidates.new_files() {
                println!("new      {}", candidate.path.display());
            }
            for candidate in candidates.missing() {
                println!("missing  {}", candidate.path.display());
            }
            println!("{} files, {} importable", candidates.len(), candidates.importable().count());
        },
        Command::Import { dir, retail } => {
            let report = library.import(&dir, CopySlot::from_retail(retail)).await.or_raise(|| ErrorKind::Command)?;
            for (path, outcome) in &report.outcomes {
                println!("{}: {outcome}", path.display());
            }
            for path in &report.failed {
                println!("{}: failed", path.display());
            }
            println!("{report}");
        },
        Command::Refresh => {
            let report = library.refresh().await.or_raise(|| ErrorKind::Command)?;
            println!(
                "{} copies removed, {} books removed, {} renamed",
                report.removed_copies, report.removed_books, report.renamed
            );
        },
        Command::List => library.books().books().for_each(print_book),
        Command::Search { query } => {
            library.search(&query.join(" ")).or_raise(|| ErrorKind::Command)?.into_iter().for_each(print_book);
        },
        Command::Edit { id, field, value } => {
            let name: FieldName = field.parse::<FieldName>().or_raise(|| ErrorKind::Input)?;
            let field = EditableField::parse(name, &value).or_raise(|| ErrorKind::Input)?;
            match library.edit(id, field).await.or_raise(|| ErrorKind::Command)? {
                true => println!("updated {name} of #{id}"),
                false => println!("#{id} unchanged"),
            }
        },
        Command::Flag { id, retail } => {
            let slot = CopySlot::from_retail(retail);
            library.flag_for_replacement(id, slot).await.or_raise(|| ErrorKind::Command)?;
            println!("{slot} copy of #{id} flagged for replacement");
        },
        Command::Remove { id } => {
            let book = library.remove(id).await.or_raise(|| ErrorKind::Command)?;
            println!("removed #{} {}", book.id, book.metadata.title);
        },
        Command::RebuildIndex => {
            let count = library.rebuild_index().await.or_raise(|| ErrorKind::Command)?;
            println!("indexed {count} books");
        },
        Command::Backup => match library.backup().await.or_raise(|| ErrorKind::Command)? {
            BackupOutcome::Committed => println!("catalog committed"),
            BackupOutcome::Unchanged => println!("catalog unchanged"),
        },
    }
    library.close().await.or_raise(|| ErrorKind::Command)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    // Dropping the command future on Ctrl-C drops the library with it, which
    // releases the lock.
    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = ?e, "Command failed");
                ExitCode::FAILURE
            },
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            ExitCode::from(130)
        },
    }
}
