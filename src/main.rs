use std::process::ExitCode;

fn main() -> ExitCode {
    // `.env` may carry RUST_LOG; it must be loaded before logging starts.
    dotenvy::dotenv().ok();

    match psd_fit::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
