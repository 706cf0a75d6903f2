use std::process::ExitCode;

fn main() -> ExitCode {
    qq::cli::main()
}
