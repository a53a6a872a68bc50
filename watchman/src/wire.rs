//! Diagnostic tracing of raw frames.
//!
//! Enable with a filter such as `watchman::wire=trace`.

use tracing::{enabled, trace, Level};

pub(crate) const TARGET: &str = "watchman::wire";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Request,
    Response,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

pub(crate) fn log_frame(direction: Direction, frame: &[u8]) {
    if enabled!(target: TARGET, Level::TRACE) {
        let text = String::from_utf8_lossy(frame);
        trace!(
            target: TARGET,
            direction = direction.as_str(),
            "{}",
            text.trim_end()
        );
    }
}
