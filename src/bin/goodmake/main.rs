//! The binary entrypoint for `goodmake`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::util::SubscriberInitExt;

mod log;

/// Invoked as `<tool> <interpreter> <script> [<target>...]`. `<interpreter>`
/// is supplied by the kernel when the script is executable with a `#!` line
/// pointing at this tool; the script's own shebang tells us the real
/// interpreter, so this positional is read and ignored.
#[derive(Debug, Parser)]
#[command(name = "goodmake", about = "A recursive build orchestrator")]
struct Cli {
    /// Ignored: supplied by the kernel's `#!` handling.
    interpreter: PathBuf,

    /// The build script to run.
    script: PathBuf,

    /// Targets to build. Defaults to `default`.
    #[arg(trailing_var_arg = true)]
    targets: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    log::make_logger()?.init();

    let targets = if cli.targets.is_empty() {
        vec!["default".to_string()]
    } else {
        cli.targets
    };

    let cwd = std::env::current_dir()?;
    let result = goodmake::driver::run(cwd, cli.script, targets).await;

    Ok(ExitCode::from(result.exit_code.clamp(0, 255) as u8))
}
