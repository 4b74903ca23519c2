mod cli;
mod demo;
mod infra;

use ods_licensing::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
