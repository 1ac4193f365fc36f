//! Reindex command - rebuild the semantic index and graph from the record store.

use anyhow::Result;
use clap::Args;
use console::style;
use serde_json::json;

use super::Context;

/// Arguments for the reindex command.
#[derive(Args, Debug)]
pub struct ReindexArgs {}

/// Run the reindex command.
pub async fn run(_args: ReindexArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let report = engine.rebuild_indexes().await;

    if ctx.json_output {
        let body = json!({
            "memories": report.memories,
            "embedded": report.embedded,
            "mirrored": report.mirrored,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!(
            "{} {} memories: {} embedded, {} mirrored into the graph",
            style("Reindexed").green(),
            report.memories,
            report.embedded,
            report.mirrored
        );
    }
    Ok(())
}
