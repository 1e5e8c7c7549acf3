use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::embed::create_embedder;
use crate::graph::NodeKind;
use crate::index::{clear_repository, index_repository, IndexOptions};
use crate::retrieve::Retriever;
use crate::store::{SearchFilters, VectorStore};
use crate::workspace::FsWorkspace;

#[derive(Parser)]
#[command(name = "repograph")]
#[command(author, version, about = "Repository code graph indexing and retrieval")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration to .repograph/
    Init,

    /// Index the repository into the graph and vector store
    Index {
        /// Repository identifier (defaults to the directory name)
        #[arg(short, long)]
        repo: Option<String>,

        /// Wipe the repository namespace before uploading
        #[arg(long)]
        clear: bool,

        /// Build the graph only, skip embeddings and upload
        #[arg(long)]
        no_embed: bool,

        /// Write the completed graph as JSON to this path
        #[arg(long)]
        graph_out: Option<PathBuf>,
    },

    /// Search the indexed repository
    Search {
        /// Search query
        query: String,

        /// Repository identifier (defaults to the directory name)
        #[arg(short, long)]
        repo: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Restrict to node kinds (chunk, comment, import, ...)
        #[arg(short, long)]
        kind: Vec<String>,

        /// Exclude results from these file paths
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Delete everything stored for the repository
    Clear {
        /// Repository identifier (defaults to the directory name)
        #[arg(short, long)]
        repo: Option<String>,
    },
}

pub async fn run(cli: Cli, config: Config, root: PathBuf) -> Result<()> {
    match cli.command {
        Commands::Init => init(&config, &root),
        Commands::Index {
            repo,
            clear,
            no_embed,
            graph_out,
        } => index(&config, &root, repo, clear, no_embed, graph_out).await,
        Commands::Search {
            query,
            repo,
            limit,
            kind,
            exclude,
        } => search(&config, &root, &query, repo, limit, kind, exclude).await,
        Commands::Clear { repo } => clear(&config, &root, repo).await,
    }
}

fn init(config: &Config, root: &Path) -> Result<()> {
    let mut config = config.clone();
    if config.store.db_path.is_none() {
        config.store.db_path = Some("index.lance".to_string());
    }
    config.save(root)?;
    println!(
        "Wrote configuration to {}",
        Config::repograph_dir(root).display()
    );
    Ok(())
}

async fn index(
    config: &Config,
    root: &Path,
    repo: Option<String>,
    clear: bool,
    no_embed: bool,
    graph_out: Option<PathBuf>,
) -> Result<()> {
    let repo_id = repo.unwrap_or_else(|| default_repo_id(root));
    let workspace = FsWorkspace::new(root.to_path_buf(), &config.indexer);
    let embedder = create_embedder(&config.embeddings)?;
    let store = open_store(config, root).await?;

    info!(repo = %repo_id, provider = embedder.provider_name(), "Indexing repository");
    let options = IndexOptions {
        clear_namespace: clear,
        embed: !no_embed,
    };
    let outcome = index_repository(
        &repo_id,
        &workspace,
        embedder.as_ref(),
        &store,
        &config.indexer,
        options,
    )
    .await?;

    if let Some(path) = graph_out {
        let json = outcome.graph.to_json()?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write graph to {}", path.display()))?;
        println!("Graph written to {}", path.display());
    }

    println!("{}", outcome.stats.summary());
    println!(
        "{} nodes, {} edges, {} records uploaded",
        outcome.graph.node_count(),
        outcome.graph.edge_count(),
        outcome.uploaded
    );
    Ok(())
}

async fn search(
    config: &Config,
    root: &Path,
    query: &str,
    repo: Option<String>,
    limit: usize,
    kinds: Vec<String>,
    exclude: Vec<String>,
) -> Result<()> {
    let repo_id = repo.unwrap_or_else(|| default_repo_id(root));
    let embedder = create_embedder(&config.embeddings)?;
    let store = open_store(config, root).await?;

    let filters = SearchFilters {
        kinds: parse_kinds(&kinds)?,
        exclude_paths: exclude,
    };
    let retriever = Retriever::new(embedder.as_ref(), &store);
    let hits = retriever.search(query, &repo_id, limit, &filters).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{}:{}-{}  {:.3}  {}",
            hit.path, hit.start_line, hit.end_line, hit.score, hit.name
        );
        for line in hit.code.lines().take(3) {
            println!("    {}", line);
        }
    }
    Ok(())
}

async fn clear(config: &Config, root: &Path, repo: Option<String>) -> Result<()> {
    let repo_id = repo.unwrap_or_else(|| default_repo_id(root));
    let store = open_store(config, root).await?;
    clear_repository(&store, &repo_id).await?;
    println!("Cleared repository '{}'", repo_id);
    Ok(())
}

async fn open_store(config: &Config, root: &Path) -> Result<VectorStore> {
    let db_path = config.db_path(root);
    let store = VectorStore::connect(db_path.as_deref(), config.store.timeout_secs).await?;
    Ok(store)
}

fn default_repo_id(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string())
}

fn parse_kinds(kinds: &[String]) -> Result<Vec<NodeKind>> {
    kinds
        .iter()
        .map(|k| {
            NodeKind::parse(k).ok_or_else(|| anyhow::anyhow!("Unknown node kind: {}", k))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        let kinds = parse_kinds(&["chunk".to_string(), "comment".to_string()]).unwrap();
        assert_eq!(kinds, vec![NodeKind::Chunk, NodeKind::Comment]);
        assert!(parse_kinds(&["widget".to_string()]).is_err());
    }

    #[test]
    fn test_default_repo_id() {
        assert_eq!(default_repo_id(Path::new("/tmp/my-project")), "my-project");
    }

    #[test]
    fn test_cli_parses_index_flags() {
        let cli = Cli::try_parse_from(["repograph", "index", "--clear", "--no-embed"]).unwrap();
        match cli.command {
            Commands::Index {
                clear, no_embed, ..
            } => {
                assert!(clear);
                assert!(no_embed);
            }
            _ => panic!("expected index command"),
        }
    }
}
