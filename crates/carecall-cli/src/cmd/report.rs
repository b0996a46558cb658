use crate::client::Client;
use crate::output::print_json;
use anyhow::bail;
use carecall_core::status::QueueStatus;
use carecall_core::types::{CallOutcome, ProviderEvent, RowNumber};

/// Build the provider event named on the command line.
pub fn parse_event(
    event: &str,
    outcome: Option<&str>,
    reason: Option<&str>,
) -> anyhow::Result<ProviderEvent> {
    Ok(match event.replace('-', "_").as_str() {
        "answered" => ProviderEvent::Answered,
        "no_answer" => ProviderEvent::NoAnswer,
        "busy" => ProviderEvent::Busy,
        "failed" => ProviderEvent::Failed {
            reason: reason.unwrap_or("reported failed").to_string(),
        },
        "completed" => match outcome {
            Some(o) => ProviderEvent::Completed {
                outcome: o.parse::<CallOutcome>()?,
            },
            None => bail!("'completed' needs --outcome"),
        },
        other => bail!(
            "unknown event '{other}' (expected answered, no_answer, busy, failed or completed)"
        ),
    })
}

pub fn run(
    client: &Client,
    row_number: RowNumber,
    event: ProviderEvent,
    json: bool,
) -> anyhow::Result<()> {
    let status: QueueStatus = client.post(
        &format!("/api/calls/{row_number}/events"),
        Some(serde_json::to_value(&event)?),
    )?;
    if json {
        return print_json(&status);
    }
    println!("row {row_number}: {event} recorded");
    super::status::print_status(&status);
    Ok(())
}
