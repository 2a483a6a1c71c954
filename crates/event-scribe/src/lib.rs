//! Append-only JSON-lines persistence for host application events.
//!
//! An [`EventSink`] subscribes to the `report` channel of a host
//! [`EventBus`]. Every event it receives while active is redacted (see
//! [`redact::redact`]), encoded as one line of JSON that tolerates cyclic
//! object graphs (see [`serialize()`]), and queued on a [`DurableWriter`]
//! whose background task appends it to the destination file.
//!
//! ```text
//! host bus --report--> EventSink --[gate]--> redact --> serialize
//!                                                           |
//!                                   file <-- DurableWriter <-+
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use event_scribe::{EventSink, LocalBus, SinkOptions, Value, REPORT_CHANNEL};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(LocalBus::new());
//! let mut sink = EventSink::new(SinkOptions::new("/var/log/app/events.log"))?;
//! sink.start(bus.clone()).await?;
//!
//! let event = Value::from(serde_json::json!({"event": "request", "id": 1}));
//! bus.emit(REPORT_CHANNEL, "request", &event);
//!
//! sink.stop();
//! let summary = sink.finished().await?;
//! assert_eq!(summary.lines, 1);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod gate;
pub mod options;
pub mod redact;
pub mod serialize;
pub mod sink;
pub mod value;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use bus::{EventBus, Handler, LocalBus, SubscriptionId};
pub use gate::Gate;
pub use options::SinkOptions;
pub use serialize::{
    serialize, to_line, CIRCULAR_PLACEHOLDER, DEPTH_PLACEHOLDER, LINE_DELIMITER, MAX_DEPTH,
};
pub use sink::{EventSink, SinkError, REPORT_CHANNEL};
pub use value::{Map, Value};
pub use writer::{DurableWriter, WriteError, WriteSummary, WriterInput};
