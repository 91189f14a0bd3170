use std::process::ExitCode;

fn main() -> ExitCode {
    logicall_cli::run()
}
