//! CLI `re-embed` command — regenerate all entry embeddings with the current model.

use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::EchoConfig;
use crate::db;
use crate::diary::store;
use crate::embedding;

/// Entries embedded per inference batch.
const BATCH_SIZE: usize = 32;

/// Recompute the embedding of every stored entry with the configured model.
pub async fn re_embed(config: &EchoConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path).context("failed to open database")?;

    let provider: Arc<dyn embedding::EmbeddingProvider> = Arc::from(
        embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?,
    );

    let entries = store::all_entries_for_embedding(&conn)?;
    let total = entries.len();
    if total == 0 {
        println!("No entries to re-embed.");
        return Ok(());
    }

    println!(
        "Re-embedding {total} entries with model '{}'...",
        config.embedding.model
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );

    for chunk in entries.chunks(BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(_, content)| content.clone()).collect();
        let provider = Arc::clone(&provider);

        let embeddings = tokio::task::spawn_blocking(move || {
            let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            provider.embed_batch(&text_refs)
        })
        .await?
        .context("embedding batch failed")?;

        for ((id, _), emb) in chunk.iter().zip(embeddings.iter()) {
            store::update_embedding(&conn, id, emb)?;
        }

        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();

    db::migrations::set_embedding_model(&conn, &config.embedding.model)?;

    println!(
        "Re-embedded {total} entries with model '{}'.",
        config.embedding.model
    );
    Ok(())
}
