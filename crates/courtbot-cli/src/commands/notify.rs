//! The notify command: scraper output in, at most one mail out.

use std::path::Path;

use courtbot_core::{Notification, NotificationKind, ScraperRun, hit_lines};
use courtbot_google::{GmailClient, MailMessage};
use tracing::{info, warn};

use super::calendar::filter_lines;
use super::{access_token, read_input};
use crate::config::CourtbotConfig;
use crate::error::{CliError, CliResult};
use crate::scraper;

/// Gmail's alias for the authenticated user.
const SENDER: &str = "me";

/// Runs (or reads) the scraper, classifies the result and sends the mail.
pub async fn run(
    config: &CourtbotConfig,
    input: Option<&Path>,
    dry_run: bool,
    calendar_filter: bool,
) -> CliResult<()> {
    let run = match input {
        Some(path) => ScraperRun::new(read_input(Some(path))?, "", true),
        None => scraper::run(&config.notify.scraper, config.notify.scraper_timeout()).await?,
    };

    let Some(mut notification) = Notification::classify(&run) else {
        println!("No availability found; not sending mail.");
        return Ok(());
    };

    if notification.kind == NotificationKind::Availability
        && (calendar_filter || config.notify.calendar_filter)
    {
        let hits = hit_lines(&run.stdout);
        match filter_lines(config, &hits).await {
            Ok(kept) => match Notification::availability(&kept) {
                Some(filtered) => notification = filtered,
                None => {
                    println!("All availability clashes with the calendar; not sending mail.");
                    return Ok(());
                }
            },
            Err(e) if e.needs_reauth() => return Err(e),
            Err(e) => warn!("calendar filter failed, sending unfiltered: {}", e),
        }
    }

    if dry_run {
        let to = config
            .notify
            .recipient()
            .unwrap_or_else(|_| "(notify.to unset)".to_string());
        println!("{}", render(&notification, &to));
        return Ok(());
    }

    let to = config.notify.recipient().map_err(CliError::Config)?;
    let token = access_token(config).await?;
    let gmail = GmailClient::new(token, config.timeout())?;
    let message = MailMessage::new(to, &notification.subject, &notification.body);
    let id = gmail.send(SENDER, &message).await?;

    info!(kind = notification.kind.as_str(), "notification sent");
    println!("Sent ({}): {}", notification.kind.as_str(), id);
    Ok(())
}

/// Plain-text preview used by `--dry-run`.
fn render(notification: &Notification, to: &str) -> String {
    format!(
        "To: {}\nSubject: {}\nKind: {}\n\n{}",
        to,
        notification.subject,
        notification.kind.as_str(),
        notification.body
    )
}
