mod cli;
mod run;
mod scene;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Inspect(args) => run::inspect(args),
        Command::Render(args) => run::render(args),
        Command::Animate(args) => run::animate(args),
    }
}
