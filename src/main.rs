use clap::Parser;

mod commands;
mod output;

use commands::deploy;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sfdelta")]
#[command(version = VERSION)]
#[command(about = "Incremental org deployment from a git revision range")]
struct Cli {
    #[command(flatten)]
    args: deploy::DeployArgs,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = deploy::run(cli.args);
    let exit_code = output::print_result(result);

    std::process::ExitCode::from(output::exit_code_to_u8(exit_code))
}
