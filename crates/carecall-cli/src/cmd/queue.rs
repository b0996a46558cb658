use crate::client::Client;
use crate::output::print_json;
use carecall_core::status::QueueStatus;
use clap::ValueEnum;

#[derive(Clone, Copy, ValueEnum)]
pub enum QueueAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    /// Abandon the call in progress and move on
    Skip,
}

impl QueueAction {
    fn path(self) -> &'static str {
        match self {
            Self::Start => "/api/queue/start",
            Self::Pause => "/api/queue/pause",
            Self::Resume => "/api/queue/resume",
            Self::Stop => "/api/queue/stop",
            Self::Reset => "/api/queue/reset",
            Self::Skip => "/api/queue/skip-current",
        }
    }
}

pub fn run(client: &Client, action: QueueAction, json: bool) -> anyhow::Result<()> {
    let status: QueueStatus = client.post(action.path(), None)?;
    if json {
        return print_json(&status);
    }
    super::status::print_status(&status);
    Ok(())
}
