use anyhow::{Context, Result};
use bookfinder_catalog::{CatalogStats, CatalogStore};
use bookfinder_common::{logger, AppConfig, CatalogRecord};
use bookfinder_server::{AppState, SyncRequest, YearInput};
use bookfinder_sources::Isbn;
use bookfinder_vector::DiscoveryRequest;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "bookfinder")]
#[command(about = "Book Finder - book catalog reconciliation and semantic discovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,
    },

    /// Fetch a book from the providers and store it
    Sync {
        /// Book ISBN (10 or 13 digits, separators allowed)
        isbn: String,

        /// Title hint, also used for the search fallback
        #[arg(long)]
        title: Option<String>,

        /// Author hint, also used for the search fallback
        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        edition: Option<String>,

        #[arg(long)]
        publisher: Option<String>,
    },

    /// Bulk-load books from a JSON array of sync requests
    Setup {
        /// Input file
        #[arg(long, default_value = "books.json")]
        input: PathBuf,

        /// Only process the first N entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Build the vector index for discovery
    Index {
        /// Rebuild even when the catalog is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Find books by meaning
    Discover {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Keep the similarity order
        #[arg(long)]
        no_rerank: bool,
    },

    /// Show one stored book
    Details { isbn: String },

    /// Keyword search over titles and authors
    Search { query: String },

    /// Show catalog statistics
    Stats,

    /// Show a quick start guide
    Guide,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    let Some(command) = cli.command else {
        print_guide();
        return Ok(());
    };

    if let Commands::Serve { host, port } = &command {
        if let Some(host) = host {
            std::env::set_var("SERVER_HOST", host);
        }
        if let Some(port) = port {
            std::env::set_var("SERVER_PORT", port.to_string());
        }
    }

    let config = AppConfig::from_env()?;
    config.validate()?;
    config.ensure_directories()?;

    match command {
        Commands::Serve { .. } => {
            logger::setup_logging(&config.log_dir, &config.log_level)?;

            tracing::info!("Book Finder starting...");
            tracing::info!("  Catalog: {}", config.catalog_db_path.display());
            tracing::info!("  Index: {}", config.vector_index_path.display());
            tracing::info!("  Embedding model: {}", config.embedding_model);

            println!("Server listening on http://{}", config.server_bind_address());
            bookfinder_server::start_server(config).await?;
        }
        Commands::Sync {
            isbn,
            title,
            author,
            year,
            edition,
            publisher,
        } => {
            logger::setup_console_logging("warn")?;
            let state = AppState::new(config).await?;

            println!("Triggering sync for ISBN {}.", isbn);
            let request = SyncRequest {
                isbn: Some(isbn),
                title,
                author,
                year: year.map(YearInput::Text),
                edition,
                publisher,
            };
            let outcome = state.workflow.sync(&request).await?;

            if !outcome.stored {
                println!("No ISBN found by the providers; nothing saved.");
                return Ok(());
            }
            println!(
                "Success! Book {} {}.",
                outcome.record.isbn,
                if outcome.created { "added" } else { "updated" }
            );
            println!("Fetched Title: {}", display(&outcome.record.title));
            println!(
                "Description:   {}",
                if outcome.description_found { "found" } else { "not found" }
            );
            for report in &outcome.reports {
                println!("  {:<14} {:?}", report.provider, report.outcome);
            }
        }
        Commands::Setup { input, limit } => {
            logger::setup_console_logging("warn")?;

            let data = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let mut requests: Vec<SyncRequest> = serde_json::from_str(&data)
                .with_context(|| format!("{} is not a JSON array of books", input.display()))?;
            if let Some(limit) = limit {
                requests.truncate(limit);
            }

            let state = AppState::new(config).await?;
            println!("Syncing {} books from {}", requests.len(), input.display());

            let pb = progress_bar(requests.len())?;
            let report = state
                .workflow
                .sync_batch(requests, |done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                })
                .await;
            pb.finish_and_clear();

            println!(
                "Stored {}/{} books ({} with description, {} unmatched)",
                report.synced, report.total, report.with_description, report.unmatched
            );
            for failure in &report.failures {
                println!(
                    "  #{} {}: {}",
                    failure.index,
                    failure.isbn.as_deref().unwrap_or("<no isbn>"),
                    failure.error
                );
            }
        }
        Commands::Index { force } => {
            logger::setup_console_logging("warn")?;
            let state = AppState::new(config).await?;

            let pb = progress_bar(0)?;
            let report = state
                .workflow
                .rebuild_index(force, |done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                })
                .await?;
            pb.finish_and_clear();

            if report.rebuilt {
                println!(
                    "Indexed {} books with {}",
                    report.indexed, report.embedding_model
                );
            } else {
                println!(
                    "Index already up to date ({} books); use --force to rebuild",
                    report.indexed
                );
            }
        }
        Commands::Discover {
            query,
            top_k,
            no_rerank,
        } => {
            logger::setup_console_logging("warn")?;
            let state = AppState::new(config).await?;

            let request = DiscoveryRequest {
                query: query.clone(),
                top_k,
                rerank: Some(!no_rerank),
            };
            let results = state.retriever.discover(&request).await?;

            if results.is_empty() {
                println!("No matches for '{}'.", query);
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{:>2}. {} ({}% match)",
                    rank + 1,
                    result.record.label(),
                    result.match_percent
                );
                if let Some(explanation) = &result.explanation {
                    println!("    {}", explanation);
                }
            }
        }
        Commands::Details { isbn } => {
            let catalog = CatalogStore::connect(&config.catalog_db_path).await?;
            let isbn = Isbn::parse(&isbn)?;

            match catalog.get(&isbn).await? {
                Some(record) => print_details(&record),
                None => println!("Book with ISBN {} not found in database.", isbn),
            }
        }
        Commands::Search { query } => {
            let catalog = CatalogStore::connect(&config.catalog_db_path).await?;
            let books = catalog.list(Some(&query), 50).await?;

            if books.is_empty() {
                println!("No books found for '{}'.", query);
                return Ok(());
            }

            println!("\nFound {} books:", books.len());
            println!("{}", "-".repeat(50));
            for book in &books {
                println!("Title:  {}", display(&book.title));
                println!("Author: {}", display(&book.author));
                println!("ISBN:   {}", book.isbn);
                println!("{}", "-".repeat(50));
            }
        }
        Commands::Stats => {
            let catalog = CatalogStore::connect(&config.catalog_db_path).await?;
            print_stats(&catalog.stats().await?);
        }
        Commands::Guide => print_guide(),
    }

    Ok(())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn print_details(record: &CatalogRecord) {
    println!("\nBook Details");
    println!("Title:       {}", display(&record.title));
    println!("Author:      {}", display(&record.author));
    println!(
        "Year:        {}",
        record.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("Edition:     {}", display(&record.edition));
    println!("Publisher:   {}", display(&record.publisher));
    match &record.description {
        Some(description) => {
            let excerpt: String = description.chars().take(200).collect();
            let ellipsis = if description.chars().count() > 200 { "..." } else { "" };
            println!("Description: {}{}", excerpt, ellipsis);
        }
        None => println!("No description"),
    }
}

fn print_stats(stats: &CatalogStats) {
    println!("\nCurrent Database Statistics");
    println!("Total Books:       {}", stats.total_books);
    println!(
        "Described:         {} ({:.1}%)",
        stats.described_books,
        stats.description_coverage()
    );
    println!("Unique Publishers: {}", stats.unique_publishers);
    if let Some(years) = &stats.years {
        println!(
            "Year Range:        {} - {} (Avg: {:.0})",
            years.min, years.max, years.average
        );
    }

    println!("\nDescription Metrics");
    match &stats.description_length {
        Some(lengths) => {
            println!("Longest:           {} characters", lengths.max);
            println!("Shortest:          {} characters", lengths.min);
            println!("Average:           {:.0} characters", lengths.average);
        }
        None => println!("No descriptions found."),
    }

    println!("\nTop Authors");
    if stats.top_authors.is_empty() {
        println!("No author data found.");
    }
    for author in &stats.top_authors {
        println!("{:>5}  {}", author.count, author.author);
    }
    println!();
}

fn print_guide() {
    println!(
        r#"
Welcome to Book Finder!

HOW TO USE?

1. Add a book (details are fetched from Google Books, Open Library and OpenAlex):
   bookfinder sync 9780747532743

2. Bulk-load a JSON array of {{"isbn", "title", "author", ...}} objects:
   bookfinder setup --input books.json --limit 100

3. Build the discovery index (needs Ollama running):
   bookfinder index

4. Find books by meaning:
   bookfinder discover "a wizard school adventure"

5. Keyword search and details:
   bookfinder search "Harry Potter"
   bookfinder details 9780747532743

6. Start the HTTP API:
   bookfinder serve
"#
    );
}
