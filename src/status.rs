//! Index status overview.
//!
//! Lists the live collection of every indexed company (passages,
//! dimensionality, model, chunk parameters, build time) and the configured
//! companies that have not been indexed yet. Used by `filing-rag index
//! status`.

use anyhow::Result;

use filing_rag_core::models::CollectionInfo;
use filing_rag_core::store::VectorStore;

use crate::config::Config;

/// Query the store and print the status table for `code` (or everything).
pub async fn run_status(
    config: &Config,
    store: &dyn VectorStore,
    code: Option<&str>,
) -> Result<()> {
    let collections: Vec<CollectionInfo> = store
        .list_collections()
        .await?
        .into_iter()
        .filter(|c| code.map_or(true, |code| c.company_code == code))
        .collect();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Database:  {} ({})", config.db.path.display(), format_bytes(db_size));
    println!();
    print!("{}", render_collections(&collections, chrono::Utc::now().timestamp()));

    let missing = unindexed(config, &collections, code);
    if !missing.is_empty() {
        println!();
        println!("Not indexed: {}", missing.join(", "));
    }

    Ok(())
}

/// Run `filing-rag index drop`: remove one company's collection.
pub async fn run_drop(store: &dyn VectorStore, code: &str) -> Result<()> {
    if store.drop_collection(code).await? {
        tracing::info!(company = code, "collection dropped");
        println!("Dropped index collection for {}.", code);
    } else {
        println!("No index collection for {}.", code);
    }
    Ok(())
}

/// Fixed-width table of collections.
pub fn render_collections(collections: &[CollectionInfo], now: i64) -> String {
    if collections.is_empty() {
        return "No index collections. Run `filing-rag index build all` first.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>8} {:>6} {:<28} {:>11}   {}\n",
        "COMPANY", "PASSAGES", "DIMS", "MODEL", "CHUNK/OVLP", "BUILT"
    ));
    out.push_str(&format!("{}\n", "-".repeat(84)));
    for c in collections {
        out.push_str(&format!(
            "{:<12} {:>8} {:>6} {:<28} {:>11}   {}\n",
            c.company_code,
            c.passage_count,
            c.dims,
            c.model,
            format!("{}/{}", c.chunk_size, c.overlap),
            format_ts_relative(c.built_at, now)
        ));
    }
    out
}

/// Configured company codes without a collection, in config order.
fn unindexed(config: &Config, collections: &[CollectionInfo], code: Option<&str>) -> Vec<String> {
    config
        .companies
        .iter()
        .filter(|c| code.map_or(true, |code| c.code == code))
        .filter(|c| !collections.iter().any(|col| col.company_code == c.code))
        .map(|c| c.code.clone())
        .collect()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to `now` (e.g. "3 hours ago").
fn format_ts_relative(ts: i64, now: i64) -> String {
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
