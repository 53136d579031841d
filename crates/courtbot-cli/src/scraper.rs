//! Running the availability scraper as a child process.

use std::process::Stdio;
use std::time::Duration;

use courtbot_core::ScraperRun;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{CliError, CliResult};

/// Runs `argv` and captures its output.
///
/// A non-zero exit, a signal and a timeout all produce an unsuccessful
/// [`ScraperRun`]; only failing to start the program is an error. The child
/// is killed when the timeout fires.
pub async fn run(argv: &[String], timeout: Duration) -> CliResult<ScraperRun> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| CliError::Scraper("scraper command is empty".to_string()))?;

    info!("running scraper: {}", argv.join(" "));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CliError::Scraper(format!("failed to start `{}`: {}", program, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.status.success() {
                warn!("scraper exited with {}", output.status);
            }
            debug!("scraper wrote {} bytes of stdout", stdout.len());
            Ok(ScraperRun::new(stdout, stderr, output.status.success()))
        }
        Ok(Err(e)) => Err(CliError::Scraper(format!("failed to collect scraper output: {}", e))),
        Err(_) => {
            warn!("scraper timed out after {}s", timeout.as_secs());
            Ok(ScraperRun::new(
                "",
                format!("scraper timed out after {}s and was killed", timeout.as_secs()),
                false,
            ))
        }
    }
}
