use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match gradlens_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gradlens stopped");
            eprintln!("gradlens: {e}");
            ExitCode::FAILURE
        }
    }
}
