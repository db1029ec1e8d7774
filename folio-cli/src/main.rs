use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use folio_core::index::SearchIndex;
use folio_core::{
    FolioConfig, IngestionService, TaskKind, TaskRunner, TaskStatus, TextSearch, TypesenseIndex,
    DEFAULT_PROJECT,
};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about = "Folio - document ingestion into Typesense")]
#[command(after_help = "Examples:
  folio run --task investigate                  Fan folders out into upload tasks
  folio run --task upload                       Convert and index waiting files
  folio create-task 1AbC-folder-id eng          Queue a Google Drive folder
  folio create-task ~/scans rus -p local        Queue a local directory
  folio search \"courier network\"                Search a project's pages
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task runner until interrupted
    #[command(alias = "worker")]
    Run {
        /// Task kind this runner processes (investigate, upload)
        #[arg(short, long)]
        task: TaskKind,
    },

    /// Queue an investigate task for a file, folder or drive link
    #[command(alias = "add")]
    CreateTask {
        /// Local path, URL, or Google Drive id/link
        source: String,
        /// OCR language code, e.g. eng, rus, deu
        lang: String,
        /// Source provider (google, local)
        #[arg(short, long, default_value = "google")]
        provider: String,
        /// Project (page collection) the documents go into
        #[arg(long, default_value = DEFAULT_PROJECT)]
        project: String,
    },

    /// Full-text search over a project's pages
    #[command(alias = "find", alias = "s")]
    Search {
        /// Search query
        query: String,
        #[arg(long, default_value = DEFAULT_PROJECT)]
        project: String,
        /// Limit results
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// List tasks of one kind
    #[command(alias = "ls")]
    Tasks {
        /// Task kind (investigate, upload)
        #[arg(short, long, default_value = "upload")]
        kind: TaskKind,
        /// Only tasks in this status (waiting, pending, success, failed)
        #[arg(short, long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Project")]
    project: String,
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "Book")]
    book: String,
    #[tabled(rename = "Page")]
    page: u32,
    #[tabled(rename = "Snippet")]
    snippet: String,
}

fn print_header(text: &str) {
    println!("\n{} {}", "=>".bright_green(), text.bold());
}

fn print_success(text: &str) {
    println!("{} {}", "✓".bright_green(), text);
}

fn print_info(text: &str) {
    println!("{} {}", "•".bright_blue(), text);
}

fn colored_status(status: TaskStatus) -> String {
    match status {
        TaskStatus::Waiting => status.as_str().yellow().to_string(),
        TaskStatus::Pending => status.as_str().cyan().to_string(),
        TaskStatus::Success => status.as_str().green().to_string(),
        TaskStatus::Failed => status.as_str().red().to_string(),
    }
}

fn parse_status(raw: &str) -> Result<TaskStatus> {
    raw.parse::<TaskStatus>().map_err(|_| anyhow::anyhow!("Unknown status {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,folio_core=info,folio_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = FolioConfig::from_env()?;
    let index: Arc<dyn SearchIndex> = Arc::new(TypesenseIndex::new(&config)?);

    match cli.command {
        Commands::Run { task } => {
            let runner = TaskRunner::from_config(&config, task)?;
            info!("Starting {} runner", task);

            tokio::select! {
                result = runner.run() => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping {} runner", task),
            }
        }

        Commands::CreateTask {
            source,
            lang,
            provider,
            project,
        } => {
            print_header(&format!("Queueing {}", source.bright_cyan()));
            let service = IngestionService::from_config(&config, index)?;
            let task = service
                .create_investigate_task(&source, &lang, &provider, &project)
                .await?;
            print_success(&format!(
                "Created investigate task {} for {} in project {}",
                task.id.as_deref().unwrap_or("?").bright_yellow(),
                task.source_path,
                task.project_name
            ));
        }

        Commands::Search {
            query,
            project,
            limit,
        } => {
            print_header(&format!("Searching {} for \"{}\"", project, query.bright_yellow()));
            let hits = TextSearch::new(index)
                .with_per_page(limit)
                .search(&project, &query)
                .await?;

            if hits.is_empty() {
                print_info("No matching pages");
            } else {
                let rows: Vec<HitRow> = hits
                    .into_iter()
                    .map(|hit| HitRow {
                        book: hit.page.book_name,
                        page: hit.page.page_number,
                        snippet: hit.snippets.join(" … "),
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Tasks {
            kind,
            status,
            page,
            limit,
        } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let service = IngestionService::from_config(&config, index)?;
            let tasks = service.list_tasks(kind, status, page, limit).await?;

            print_header(&format!("{} {} tasks", tasks.len(), kind));
            let rows: Vec<TaskRow> = tasks
                .into_iter()
                .map(|task| TaskRow {
                    id: task.id.clone().unwrap_or_default(),
                    status: colored_status(task.status),
                    source: task.source_path,
                    name: task.file_name,
                    project: task.project_name,
                })
                .collect();
            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}
