use std::process::ExitCode;

fn main() -> ExitCode {
    match perfrpcd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("perfrpcd: {error}");
            ExitCode::FAILURE
        }
    }
}
