//! Remember command - store a memory in the current project.

use anyhow::Result;
use clap::Args;
use console::style;
use serde_json::json;

use cairn_memory::RelationshipType;

use super::Context;

/// Arguments for the remember command.
#[derive(Args, Debug)]
pub struct RememberArgs {
    /// Memory text
    pub text: String,

    /// Memory type tag (e.g. user_prompt, clarified_prompt, task_completion)
    #[arg(short = 't', long = "type", default_value = "note")]
    pub memory_type: String,

    /// Relate the new memory to an existing one (memory id)
    #[arg(long)]
    pub relates_to: Option<String>,

    /// Relationship label used with --relates-to
    #[arg(long, default_value = "RELATED_TO")]
    pub relationship: String,
}

/// Run the remember command.
pub async fn run(args: RememberArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let id = engine.remember(&args.text, &args.memory_type).await?;

    let linked = match &args.relates_to {
        Some(target) => {
            let target = cairn_memory::validation::parse_id("relates_to", target)?;
            Some(engine.link(id, target, RelationshipType::from(args.relationship.as_str())))
        }
        None => None,
    };

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "id": id, "linked": linked }))?
        );
    } else {
        println!("{} {}", style("Remembered").green(), style(id).dim());
        if linked == Some(false) {
            println!(
                "{}",
                style("Relationship not recorded (graph unavailable or target unknown)").yellow()
            );
        }
    }
    Ok(())
}
