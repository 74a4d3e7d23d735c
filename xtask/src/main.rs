#![allow(clippy::cargo_common_metadata)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Fmt,
    Check,
    Clippy,
    /// Build the pages module into `library-client/pkg`
    Build,
    /// Native unit tests, then headless browser tests
    Test,
    Doc,
    PreCommit,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match &cli.command {
        Command::Fmt => fmt(&sh)?,
        Command::Check => check(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Build => build(&sh)?,
        Command::Test => test(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::PreCommit => pre_commit(&sh)?,
    };

    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo +nightly fmt").run()?)
}

fn check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo check --all-targets --all-features --workspace").run()?;
    Ok(cmd!(
        sh,
        "cargo check --all-features --target wasm32-unknown-unknown --package rtc-tutorials --package rtc-tutorials-pages"
    )
    .run()?)
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --all-targets --all-features --workspace").run()?;
    Ok(cmd!(
        sh,
        "cargo clippy --all-features --target wasm32-unknown-unknown --package rtc-tutorials"
    )
    .run()?)
}

fn build(sh: &Shell) -> Result<()> {
    let _dir = sh.push_dir(project_root::get_project_root()?.join("library-client/"));
    Ok(cmd!(sh, "wasm-pack build --target web").run()?)
}

fn test(sh: &Shell) -> Result<()> {
    cmd!(
        sh,
        "cargo test --all-features --package rtc-tutorials-protocol --package rtc-tutorials"
    )
    .run()?;

    let _dir = sh.push_dir(project_root::get_project_root()?.join("library/"));
    cmd!(sh, "wasm-pack test --headless --firefox").run()?;
    cmd!(sh, "wasm-pack test --headless --chrome").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo doc --no-deps --all-features").run()?)
}

fn pre_commit(sh: &Shell) -> Result<()> {
    for cmd in [fmt, check, test, doc] {
        cmd(sh)?;
    }
    Ok(())
}
