//! Clear command - delete the project's records.

use anyhow::{Result, bail};
use clap::Args;
use console::style;

use super::Context;

/// Arguments for the clear command.
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Confirm deletion
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the clear command.
pub async fn run(args: ClearArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    if !args.yes {
        bail!(
            "refusing to clear project '{}' without --yes",
            engine.identity().key
        );
    }

    let removed = engine.clear().await?;
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        println!(
            "{} {} tasks, {} memories, {} discussion turns",
            style("Removed").green(),
            removed.tasks,
            removed.memories,
            removed.discussions
        );
    }
    Ok(())
}
