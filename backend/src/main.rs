use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match devcamper::start_server().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("devcamper: {e}");
            ExitCode::FAILURE
        }
    }
}
