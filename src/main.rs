//! `repoqa`: index a GitHub repository into a vector collection and ask questions
//! about its code.
//!
//! ```bash
//! repoqa index acme svc --branch main
//! repoqa ask "How is the session token verified?" --repo acme/svc@main
//! repoqa info acme svc
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use repoqa_core::bootstrap::{AppBuilder, resolve_config_path};
use repoqa_core::vault::EnvVaultProvider;
use repoqa_index::source::GithubSource;
use repoqa_index::{IndexOutcome, IndexReport, RepoRef, RepositorySource};

#[derive(Parser, Debug)]
#[command(name = "repoqa", version, about = "Question answering over GitHub repositories")]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Falls back to `REPOQA_CONFIG`, then `config/repoqa.toml`. A missing file
    /// means defaults plus environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, chunk, embed, and store a repository's source files.
    Index {
        owner: String,
        repo: String,
        /// Branch to index. Defaults to the repository's default branch.
        #[arg(long)]
        branch: Option<String>,
    },
    /// Answer a question from indexed code.
    Ask {
        question: String,
        /// Only use chunks from `owner/name` or `owner/name@branch`.
        #[arg(long)]
        repo: Option<String>,
    },
    /// Show repository metadata.
    Info { owner: String, repo: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let app = AppBuilder::load(&config_path, &EnvVaultProvider).await?;

    match cli.command {
        Command::Index {
            owner,
            repo,
            branch,
        } => run_index(&app, &owner, &repo, branch.as_deref()).await,
        Command::Ask { question, repo } => run_ask(&app, &question, repo.as_deref()).await,
        Command::Info { owner, repo } => run_info(&app, &owner, &repo).await,
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Split `owner/name[@branch]`.
fn parse_repo_spec(spec: &str) -> anyhow::Result<(String, String, Option<String>)> {
    let (path, branch) = match spec.split_once('@') {
        Some((path, branch)) if !branch.is_empty() => (path, Some(branch.to_owned())),
        Some(_) => bail!("empty branch in repository spec: {spec}"),
        None => (spec, None),
    };
    match path.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner.to_owned(), name.to_owned(), branch))
        }
        _ => bail!("expected owner/name[@branch], got: {spec}"),
    }
}

async fn resolve_ref(
    source: &GithubSource,
    owner: &str,
    repo: &str,
    branch: Option<&str>,
) -> anyhow::Result<RepoRef> {
    if let Some(branch) = branch {
        return Ok(RepoRef::new(owner, repo, branch));
    }
    let info = source
        .repository_info(owner, repo)
        .await
        .with_context(|| format!("failed to look up default branch of {owner}/{repo}"))?;
    Ok(info.repo_ref(None))
}

async fn run_index(
    app: &AppBuilder,
    owner: &str,
    repo: &str,
    branch: Option<&str>,
) -> anyhow::Result<()> {
    let source = app.build_source()?;
    let repo_ref = resolve_ref(&source, owner, repo, branch).await?;
    let provider = Arc::new(app.build_provider()?);
    let indexer = app.indexer_with(source, provider, app.build_store()?)?;
    let report = indexer.index(&repo_ref).await?;
    println!("{}", describe(&report));
    for failure in &report.failures {
        println!(
            "  skipped {} after {} attempt(s): {}",
            failure.path, failure.attempts, failure.error
        );
    }
    Ok(())
}

fn describe(report: &IndexReport) -> String {
    match report.outcome {
        IndexOutcome::EmptyRepository => format!("{}: repository is empty", report.repo),
        IndexOutcome::NoSupportedFiles => format!(
            "{}: none of {} files has a supported extension and size",
            report.repo, report.files_listed
        ),
        IndexOutcome::NothingFetched => format!(
            "{}: no content fetched from {} selected files",
            report.repo, report.files_selected
        ),
        IndexOutcome::Indexed => format!(
            "{}: indexed {} chunks from {} of {} selected files in {} ms",
            report.repo,
            report.chunks_indexed,
            report.documents,
            report.files_selected,
            report.duration_ms
        ),
    }
}

async fn run_ask(app: &AppBuilder, question: &str, repo: Option<&str>) -> anyhow::Result<()> {
    let scope = match repo {
        Some(spec) => {
            let (owner, name, branch) = parse_repo_spec(spec)?;
            Some(resolve_ref(&app.build_source()?, &owner, &name, branch.as_deref()).await?)
        }
        None => None,
    };
    let flow = app.build_flow(scope)?;
    let state = flow.ask(question).await?;
    println!("{}", state.answer().unwrap_or_default());
    Ok(())
}

async fn run_info(app: &AppBuilder, owner: &str, repo: &str) -> anyhow::Result<()> {
    let info = app.build_source()?.repository_info(owner, repo).await?;
    println!("{}", info.full_name);
    if let Some(description) = &info.description {
        println!("  {description}");
    }
    println!("  default branch: {}", info.default_branch);
    println!("  language:       {}", info.language.as_deref().unwrap_or("-"));
    println!("  size:           {} KB", info.size);
    println!("  stars / forks:  {} / {}", info.stars, info.forks);
    if !info.topics.is_empty() {
        println!("  topics:         {}", info.topics.join(", "));
    }
    println!("  clone url:      {}", info.clone_url);
    if let Some(updated) = info.updated_at {
        println!("  updated:        {}", updated.to_rfc3339());
    }
    Ok(())
}
