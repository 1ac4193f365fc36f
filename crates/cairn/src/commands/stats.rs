//! Stats command - project identity, record counts and backend reachability.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::json;

use cairn_memory::LazyState;

use super::{Context, header};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Run the stats command.
pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let status = engine.status().await;

    if ctx.json_output {
        let body = json!({
            "project": status.identity.key,
            "isolation": status.identity.isolation,
            "records": status.records,
            "schema_version": engine.store().schema_version(),
            "semantic": {
                "embedder": status.semantic.embedder.as_str(),
                "index": status.semantic.index.as_str(),
                "collection_ready": status.semantic.collection_ready,
            },
            "graph": {
                "available": status.graph_available,
                "nodes": status.graph_nodes,
            },
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    header("Project");
    println!("  Key:         {}", style(&status.identity.key).cyan());
    println!("  Isolation:   {}", status.identity.isolation);
    if let Some(name) = &status.identity.name {
        println!("  Name:        {name}");
    }
    match &status.identity.root {
        Some(root) => println!("  Marker root: {}", root.display()),
        None => println!("  Marker root: {}", dim.apply_to("(no marker, path is the key)")),
    }
    println!();

    header("Record Store");
    println!("  Tasks:       {}", style(status.records.tasks).cyan());
    println!("  Memories:    {}", style(status.records.memories).cyan());
    println!("  Discussion:  {}", style(status.records.discussions).cyan());
    println!("  Schema:      v{}", engine.store().schema_version());
    println!();

    header("Optional Backends");
    println!("  Embedder:    {}", state(status.semantic.embedder));
    println!("  Semantic:    {}", state(status.semantic.index));
    if status.graph_available {
        println!(
            "  Graph:       {} ({} nodes)",
            style("ready").green(),
            status.graph_nodes
        );
    } else {
        println!("  Graph:       {}", style("unavailable").yellow());
    }
    println!();
    Ok(())
}

fn state(state: LazyState) -> String {
    match state {
        LazyState::Ready => style(state.as_str()).green().to_string(),
        LazyState::Unavailable => style(state.as_str()).yellow().to_string(),
        LazyState::Uninitialized => style(state.as_str()).dim().to_string(),
    }
}
