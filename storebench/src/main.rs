use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    storebench::cli::execute()
}
