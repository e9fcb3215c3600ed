use std::process::ExitCode;

fn main() -> ExitCode {
    holdwise_cli::run()
}
