use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CarecallError;
use crate::record::PatientRecord;
use crate::types::RowNumber;

// ---------------------------------------------------------------------------
// DispatchRequest
// ---------------------------------------------------------------------------

/// An outbound call the driver must place. The record is already `dialing`
/// when the request is handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Session opened for this dispatch. Acknowledgments and failures must
    /// carry it back.
    pub session_id: u64,
    pub row_number: RowNumber,
    pub record: PatientRecord,
    /// 1 for the first dispatch of this record since the last reset.
    pub attempt: u32,
}

// ---------------------------------------------------------------------------
// GapToken / Next
// ---------------------------------------------------------------------------

/// Issued when the next call has to wait for the pause between calls. Hand
/// it back to `Orchestrator::dispatch_after_gap` once the pause elapsed; a
/// token from an earlier run is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GapToken(pub(crate) u64);

/// What the driver has to do after an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Nothing,
    Dispatch(DispatchRequest),
    AfterGap(GapToken),
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Result of an orchestrator operation plus the work it unlocked: a dispatch
/// to place now, or a gap to wait out before asking for one.
///
/// Dropping a `Step` without looking at `dispatch` would leave a record
/// `dialing` with nobody placing the call.
#[must_use = "a Step may carry a dispatch that has to be executed"]
#[derive(Debug, Clone, PartialEq)]
pub struct Step<T> {
    pub value: T,
    pub dispatch: Option<DispatchRequest>,
    pub gap: Option<GapToken>,
}

impl<T> Step<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            dispatch: None,
            gap: None,
        }
    }

    pub(crate) fn with_dispatch(value: T, dispatch: Option<DispatchRequest>) -> Self {
        Self {
            value,
            dispatch,
            gap: None,
        }
    }

    pub(crate) fn then(value: T, next: Next) -> Self {
        match next {
            Next::Nothing => Self::new(value),
            Next::Dispatch(request) => Self::with_dispatch(value, Some(request)),
            Next::AfterGap(token) => Self {
                value,
                dispatch: None,
                gap: Some(token),
            },
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        Step {
            value: f(self.value),
            dispatch: self.dispatch,
            gap: self.gap,
        }
    }

    pub fn into_parts(self) -> (T, Next) {
        let next = match (self.dispatch, self.gap) {
            (Some(request), _) => Next::Dispatch(request),
            (None, Some(token)) => Next::AfterGap(token),
            (None, None) => Next::Nothing,
        };
        (self.value, next)
    }
}

// ---------------------------------------------------------------------------
// OperatorCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorCommand {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    SkipCurrent,
}

impl OperatorCommand {
    pub fn all() -> &'static [OperatorCommand] {
        &[
            Self::Start,
            Self::Pause,
            Self::Resume,
            Self::Stop,
            Self::Reset,
            Self::SkipCurrent,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::SkipCurrent => "skip_current",
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorCommand {
    type Err = CarecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "reset" => Ok(Self::Reset),
            "skip" | "skip_current" | "skip-current" => Ok(Self::SkipCurrent),
            other => Err(CarecallError::UnknownCommand(other.to_string())),
        }
    }
}
