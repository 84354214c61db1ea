mod apply;
mod fit;
mod model;
mod utils;

use apply::ApplyArgs;
use clap::{
    Parser,
    Subcommand,
};
use fit::FitArgs;
use utils::UtilsArgs;
use wild::ArgsOs;

#[derive(Parser, Debug)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,)]
struct Cli {
    #[command(subcommand)]
    command: MainMenu,
}

#[derive(Subcommand, Debug)]
enum MainMenu {
    /// Select and fit sites on a cohort, then fit and score its participants.
    Fit {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  FitArgs,
    },

    /// Align a cohort to a reference clock, then fit and score its
    /// participants.
    Apply {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  ApplyArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let args: ArgsOs = wild::args_os();
    let cli = Cli::parse_from(args);

    match cli.command {
        MainMenu::Fit { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Apply { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
    }
    Ok(())
}
