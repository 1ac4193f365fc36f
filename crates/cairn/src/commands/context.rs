//! Context command - select relevant memories for a query.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, header, truncate};

/// Arguments for the context command.
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Free-text query
    pub query: String,

    /// Maximum items to return (default: configured budget)
    #[arg(short = 'n', long)]
    pub max: Option<usize>,

    /// Only include these memory types (repeatable)
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,
}

/// Run the context command.
pub async fn run(args: ContextArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let types = (!args.types.is_empty()).then_some(args.types.as_slice());
    let items = engine.context(&args.query, args.max, types).await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if items.is_empty() {
        println!("{}", dim.apply_to("No relevant memories"));
        return Ok(());
    }

    header("Context");
    for (i, item) in items.iter().enumerate() {
        println!("{}. {}", style(i + 1).cyan(), truncate(&item.text, 70));
        let score = item
            .score
            .map(|s| format!(", score {s:.3}"))
            .unwrap_or_default();
        println!(
            "   {}",
            dim.apply_to(format!("{} via {}{score}", item.item_type, item.source.as_str()))
        );
    }
    Ok(())
}
