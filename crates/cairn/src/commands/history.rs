//! History command - show or reset the discussion history.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::{Context, header};

/// Arguments for the history command.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: Option<HistoryCommand>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Print the discussion in turn order (default)
    Show,

    /// Append one turn
    Add {
        /// Speaker role (e.g. user, assistant)
        role: String,

        /// Message text
        message: String,
    },

    /// Replace the history with nothing
    Reset,
}

/// Run the history command.
pub async fn run(args: HistoryArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let store = engine.store();

    match args.command.unwrap_or(HistoryCommand::Show) {
        HistoryCommand::Show => {
            let turns = store.get_discussion_history();
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&turns)?);
            } else if turns.is_empty() {
                println!("{}", Style::new().dim().apply_to("No discussion yet"));
            } else {
                header("Discussion");
                for turn in &turns {
                    println!(
                        "{} {}",
                        style(format!("{:>3} {}:", turn.turn_index, turn.role)).cyan(),
                        turn.message
                    );
                }
            }
        }
        HistoryCommand::Add { role, message } => {
            let turn = store.add_discussion_turn(&role, &message)?;
            println!("{} turn {}", style("Added").green(), turn.turn_index);
        }
        HistoryCommand::Reset => {
            store.save_discussion_history(&[])?;
            println!("{}", style("Discussion history cleared").green());
        }
    }
    Ok(())
}
