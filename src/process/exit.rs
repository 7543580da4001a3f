use std::fmt;
use std::process::ExitCode;

use super::signals::SignalMask;

/// Exit status for a fatal error after threads have started.
pub const EXIT_RUNTIME_FAILURE: u8 = 1;
/// Exit status for a fatal error before any thread started.
pub const EXIT_INITIALISATION_FAILURE: u8 = 2;

/// How a worker process ended. The supervising agent branches on the
/// numeric codes, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    NaturalCompletion,
    ResetRequested,
    StartRequested,
    StopRequested,
}

impl ExitReason {
    /// Maps the last signals the controller saw to an exit reason. START
    /// wins over RESET, which wins over STOP and SHUTDOWN.
    #[must_use]
    pub const fn from_signals(signals: SignalMask) -> Self {
        if signals.intersects(SignalMask::START) {
            ExitReason::StartRequested
        } else if signals.intersects(SignalMask::RESET) {
            ExitReason::ResetRequested
        } else if signals.intersects(SignalMask::STOP.union(SignalMask::SHUTDOWN)) {
            ExitReason::StopRequested
        } else {
            ExitReason::NaturalCompletion
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            ExitReason::NaturalCompletion => 0,
            ExitReason::ResetRequested => 16,
            ExitReason::StartRequested => 17,
            ExitReason::StopRequested => 18,
        }
    }
}

impl From<ExitReason> for ExitCode {
    fn from(reason: ExitReason) -> Self {
        ExitCode::from(reason.code())
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::NaturalCompletion => "finished",
            ExitReason::ResetRequested => "requesting reset",
            ExitReason::StartRequested => "requesting reset and start",
            ExitReason::StopRequested => "requesting stop",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};

    #[test]
    fn signals_map_to_distinct_codes() -> AppResult<()> {
        let cases = [
            (SignalMask::NONE, 0),
            (SignalMask::RESET, 16),
            (SignalMask::START | SignalMask::STOP, 17),
            (SignalMask::STOP, 18),
            (SignalMask::SHUTDOWN, 18),
            (SignalMask::RESET | SignalMask::SHUTDOWN, 16),
        ];
        for (signals, code) in cases {
            let reason = ExitReason::from_signals(signals);
            if reason.code() != code {
                return Err(AppError::validation(format!(
                    "{} mapped to {:?}",
                    signals, reason
                )));
            }
        }
        Ok(())
    }
}
