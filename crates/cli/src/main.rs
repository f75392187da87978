use std::process::ExitCode;

fn main() -> ExitCode {
    tierwatch_cli::run()
}
