//! Feeds newline-delimited JSON from a reader onto the bus's report channel.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use event_scribe::{LocalBus, Value, REPORT_CHANNEL};

/// Counts for one run of [`pump`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub emitted: u64,
    pub skipped: u64,
}

/// Emit every JSON line read from `reader` with `tag` until end of input.
///
/// Blank lines are ignored; lines that are not valid JSON, including lines
/// that are not valid UTF-8, are skipped with a warning. Only reader I/O
/// errors end the pump early.
pub async fn pump<R>(mut reader: R, bus: &LocalBus, tag: &str) -> std::io::Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = PumpStats::default();
    let mut line = Vec::new();
    let mut line_no = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        line_no += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        // serde_json skips surrounding whitespace, including a `\r\n` ending.
        match serde_json::from_slice::<serde_json::Value>(&line) {
            Ok(event) => {
                bus.emit(REPORT_CHANNEL, tag, &Value::from(event));
                stats.emitted += 1;
            }
            Err(err) => {
                warn!(line = line_no, %err, "skipping input line that is not valid JSON");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}
