use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rustybot::{
    build_service, config, logging,
    processing::{Document, IngestOutcome, IngestRequest, MediaType, ProfileConfig},
};
use serde_json::json;
use uuid::Uuid;
use walkdir::WalkDir;

const INGESTIBLE_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

#[derive(Parser)]
#[command(
    name = "ingest-dir",
    about = "Ingest every PDF, text and Markdown file under a directory into a chatbot profile"
)]
struct Cli {
    /// Directory to walk recursively.
    dir: PathBuf,
    /// Profile display name (ignored with --append).
    #[arg(long, default_value = "Directory bot")]
    name: String,
    /// Language model recorded on the profile.
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    /// Optional system instruction.
    #[arg(long)]
    system_prompt: Option<String>,
    /// Optional sampling temperature.
    #[arg(long)]
    temperature: Option<f32>,
    /// Owner recorded on the profile.
    #[arg(long, default_value = "cli")]
    owner: String,
    /// Embedding-provider credential; falls back to OPENAI_API_KEY.
    #[arg(long)]
    credential: Option<String>,
    /// Append to an existing profile instead of creating one.
    #[arg(long)]
    append: Option<Uuid>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_cli_tracing();

    let documents = collect_documents(&cli.dir)?;
    if documents.is_empty() {
        bail!("no .pdf, .txt or .md files found under {}", cli.dir.display());
    }
    tracing::info!(dir = %cli.dir.display(), documents = documents.len(), "Collected documents");

    let service = build_service(config::get_config()).await?;
    let outcome = match cli.append {
        Some(profile_id) => service
            .append_documents(profile_id, documents, cli.credential)
            .await
            .with_context(|| format!("failed to append documents to profile {profile_id}"))?,
        None => service
            .ingest(IngestRequest {
                profile: ProfileConfig {
                    name: cli.name,
                    model: cli.model,
                    system_prompt: cli.system_prompt,
                    temperature: cli.temperature,
                    owner: cli.owner,
                },
                documents,
                credential: cli.credential,
            })
            .await
            .context("failed to ingest documents")?,
    };

    println!("{}", serde_json::to_string_pretty(&render(&outcome))?);
    Ok(())
}

fn collect_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(
                    path = ?error.path(),
                    error = %error,
                    "Skipping unreadable directory entry"
                );
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_ingestible(path))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            Ok(Document {
                media_type: MediaType::from_path(&path),
                file_name,
                content,
            })
        })
        .collect()
}

fn is_ingestible(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            INGESTIBLE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

fn render(outcome: &IngestOutcome) -> serde_json::Value {
    json!({
        "profile_id": outcome.profile.id,
        "documents": outcome.documents,
        "chunks_written": outcome.chunks_written,
        "profile": outcome.profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_extension() {
        assert!(is_ingestible(Path::new("docs/Guide.PDF")));
        assert!(is_ingestible(Path::new("notes.md")));
        assert!(!is_ingestible(Path::new("image.png")));
        assert!(!is_ingestible(Path::new("Makefile")));
    }

    #[test]
    fn collects_sorted_relative_documents() {
        let root = std::env::temp_dir().join(format!("ingest-dir-test-{}", Uuid::new_v4()));
        fs::create_dir_all(root.join("nested")).expect("mkdir");
        fs::write(root.join("b.txt"), "bravo").expect("write");
        fs::write(root.join("nested/a.md"), "alpha").expect("write");
        fs::write(root.join("skip.png"), [0_u8, 1, 2]).expect("write");

        let documents = collect_documents(&root).expect("collect");
        fs::remove_dir_all(&root).ok();

        let names: Vec<_> = documents.iter().map(|doc| doc.file_name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "nested/a.md"]);
        assert!(documents.iter().all(|doc| doc.media_type == MediaType::Text));
        assert_eq!(documents[0].content, b"bravo");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_skipped() {
        let root = std::env::temp_dir().join(format!("ingest-dir-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("kept.txt"), "kept").expect("write");
        std::os::unix::fs::symlink(root.join("missing"), root.join("dangling.txt"))
            .expect("symlink");

        let documents = collect_documents(&root);
        fs::remove_dir_all(&root).ok();

        let names: Vec<_> = documents
            .expect("collect")
            .into_iter()
            .map(|doc| doc.file_name)
            .collect();
        assert_eq!(names, vec!["kept.txt"]);
    }
}
