use std::process::ExitCode;

fn main() -> ExitCode {
    cheers_cli::run()
}
