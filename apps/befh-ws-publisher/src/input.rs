use std::io::BufRead;

use befh_core::{EventSender, HandlerEvent};
use tracing::warn;

/// Parses one input line; blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<HandlerEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Forwards newline-delimited JSON events into the queue until input ends
/// or the queue closes. Malformed lines are logged and skipped.
pub fn forward_lines<R: BufRead>(reader: R, sender: &EventSender) -> u64 {
    let mut forwarded = 0_u64;
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("input read failed at line {}: {}", index + 1, err);
                break;
            }
        };
        let event = match parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                warn!("skipping malformed event at line {}: {}", index + 1, err);
                continue;
            }
        };
        if sender.send(event).is_err() {
            break;
        }
        forwarded = forwarded.saturating_add(1);
    }
    forwarded
}
