//! Reminders command - graph-derived reminders and recent activity.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::json;

use super::{Context, header, truncate};

/// Arguments for the reminders command.
#[derive(Args, Debug)]
pub struct RemindersArgs {
    /// Window for recent activity, in hours
    #[arg(long, default_value = "24")]
    pub hours: u32,
}

/// Run the reminders command.
pub async fn run(args: RemindersArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let project = engine.identity().key.clone();
    let reminders = engine.graph().get_agent_reminders(&project);
    let recent = engine.graph().get_project_context(&project, args.hours);

    if ctx.json_output {
        let body = json!({ "reminders": reminders, "context": recent });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if !engine.graph().is_available() {
        println!("{}", dim.apply_to("Relationship graph unavailable"));
        return Ok(());
    }

    header("Reminders");
    if reminders.is_empty() {
        println!("  {}", dim.apply_to("(none)"));
    }
    for reminder in &reminders {
        println!("  {} {}", style("•").yellow(), reminder);
    }
    println!();

    header(&format!("Last {} hours", args.hours));
    for (memory_type, count) in &recent.memory_types {
        println!("  {memory_type:<20} {}", style(count).cyan());
    }
    for (relationship, count) in &recent.relationship_types {
        println!("  {relationship:<20} {}", style(count).cyan());
    }
    for node in &recent.recent_memories {
        println!("  {} {}", dim.apply_to(&node.node_type), truncate(&node.content, 60));
    }
    Ok(())
}
