use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{EventBus, Handler, SubscriptionId};
use crate::gate::Gate;
use crate::options::SinkOptions;
use crate::redact;
use crate::serialize;
use crate::value::Value;
use crate::writer::{DurableWriter, WriteError, WriteSummary, WriterInput};

/// Bus channel the sink listens on.
pub const REPORT_CHANNEL: &str = "report";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("event sink destination must not be empty")]
    EmptyDestination,

    #[error("failed to start event sink: {0}")]
    Open(#[source] WriteError),

    #[error("event sink already started")]
    AlreadyStarted,

    #[error("event sink has no running writer")]
    NotRunning,

    #[error("event log write failed: {0}")]
    Write(Arc<WriteError>),
}

/// Persists every event published on the bus's report channel as one line
/// of JSON in the destination file.
///
/// Lifecycle: [`new`](Self::new) → [`start`](Self::start) →
/// [`stop`](Self::stop) → [`finished`](Self::finished). Events delivered
/// after `stop` returns are dropped; events accepted before it are written
/// or, if the file fails, accounted for by the failure. One sink per
/// destination.
///
/// The handler may run on any thread. A handler that has passed the gate
/// finishes its push before `stop` ends the writer's input.
///
/// On a write failure the sink closes its gate, detaches from the bus and
/// logs the I/O error's message at `error` level.
pub struct EventSink {
    options: SinkOptions,
    gate: Gate,
    started: bool,
    intake: Option<Arc<Intake>>,
    writer: Option<DurableWriter>,
    watcher: Option<JoinHandle<()>>,
    subscription: Option<(Arc<dyn EventBus>, SubscriptionId)>,
}

impl EventSink {
    pub fn new(options: SinkOptions) -> Result<Self, SinkError> {
        if options.destination.as_os_str().is_empty() {
            return Err(SinkError::EmptyDestination);
        }

        Ok(Self {
            options,
            gate: Gate::new(),
            started: false,
            intake: None,
            writer: None,
            watcher: None,
            subscription: None,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.options.destination
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Events that passed the gate so far.
    pub fn admitted(&self) -> u64 {
        self.intake
            .as_ref()
            .map_or(0, |intake| intake.admitted.load(Ordering::Relaxed))
    }

    /// Open the destination for append and subscribe to the report channel.
    ///
    /// Returns once the file is open and the handler is registered; no
    /// event I/O is awaited. An open failure is returned and leaves the bus
    /// untouched.
    pub async fn start(&mut self, bus: Arc<dyn EventBus>) -> Result<(), SinkError> {
        if self.started {
            return Err(SinkError::AlreadyStarted);
        }

        let writer = DurableWriter::open(&self.options.destination)
            .await
            .map_err(SinkError::Open)?;

        self.attach(bus, writer)
    }

    /// Wire the sink to `bus` around an already spawned writer.
    ///
    /// [`start`](Self::start) uses this with a file writer; hosts that
    /// manage their own byte sink can call it directly. Must be called from
    /// within a tokio runtime.
    pub fn attach(
        &mut self,
        bus: Arc<dyn EventBus>,
        mut writer: DurableWriter,
    ) -> Result<(), SinkError> {
        if self.started {
            return Err(SinkError::AlreadyStarted);
        }
        self.started = true;

        let intake = Arc::new(Intake {
            gate: self.gate.clone(),
            input: writer.input(),
            admission: Mutex::new(()),
            admitted: AtomicU64::new(0),
        });
        let id = bus.subscribe(REPORT_CHANNEL, event_handler(Arc::clone(&intake)));

        if let Some(failure) = writer.take_failure() {
            self.watcher = Some(tokio::spawn(watch_for_failure(
                failure,
                self.gate.clone(),
                Arc::clone(&bus),
                id,
                self.options.destination.clone(),
            )));
        }

        info!(
            destination = %self.options.destination.display(),
            events = ?self.options.events,
            "event sink started"
        );

        self.intake = Some(intake);
        self.writer = Some(writer);
        self.subscription = Some((bus, id));
        Ok(())
    }

    /// Stop accepting events and let the writer drain, flush and close.
    ///
    /// Returns immediately; wait on [`finished`](Self::finished) to know
    /// the file is complete. Safe to call more than once, or before
    /// `start`.
    pub fn stop(&self) {
        let closed = match &self.intake {
            Some(intake) => intake.close(),
            None => self.gate.deactivate(),
        };
        if closed {
            debug!(
                destination = %self.options.destination.display(),
                admitted = self.admitted(),
                "event sink stopped"
            );
        }
    }

    /// Wait until every accepted line is flushed and the destination is
    /// closed, or until the writer fails.
    ///
    /// Call after [`stop`](Self::stop); until then the writer keeps
    /// waiting for input. A failure is reported here as well as through
    /// the log, and by the time this returns the sink has already detached
    /// from the bus.
    pub async fn finished(&mut self) -> Result<WriteSummary, SinkError> {
        let writer = self.writer.take().ok_or(SinkError::NotRunning)?;
        let outcome = writer.finished().await;

        if let Some(watcher) = self.watcher.take() {
            if let Err(err) = watcher.await {
                warn!(%err, "event sink failure watcher ended abnormally");
            }
        }

        outcome.map_err(SinkError::Write)
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        match &self.intake {
            Some(intake) => {
                intake.close();
            }
            None => {
                self.gate.deactivate();
            }
        }
        if let Some((bus, id)) = self.subscription.take() {
            bus.unsubscribe(REPORT_CHANNEL, id);
        }
    }
}

/// Gate and writer input shared by the bus handler and the stopper.
///
/// `admission` is held from the gate check through the push, and by
/// [`close`](Self::close) around deactivate and end, so no admitted line can
/// reach the writer after its end-of-input marker.
struct Intake {
    gate: Gate,
    input: WriterInput,
    admission: Mutex<()>,
    admitted: AtomicU64,
}

impl Intake {
    fn admission(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, tag: &str, event: &Value) {
        let _admission = self.admission();
        if !self.gate.is_active() {
            trace!(tag, "event sink inactive; event dropped");
            return;
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);

        if redact::redact(event) {
            debug!(tag, "removed raw validation input from response event");
        }

        if !self.input.push(serialize::to_line(event)) {
            warn!(tag, "event log writer no longer accepting lines; event dropped");
        }
    }

    /// Returns whether this call closed the gate.
    fn close(&self) -> bool {
        let _admission = self.admission();
        let closed = self.gate.deactivate();
        self.input.end();
        closed
    }
}

fn event_handler(intake: Arc<Intake>) -> Handler {
    Arc::new(move |tag: &str, event: &Value| intake.handle(tag, event))
}

async fn watch_for_failure(
    failure: oneshot::Receiver<Arc<WriteError>>,
    gate: Gate,
    bus: Arc<dyn EventBus>,
    subscription: SubscriptionId,
    destination: PathBuf,
) {
    // A closed channel means the writer finished cleanly.
    let Ok(err) = failure.await else {
        return;
    };

    gate.deactivate();
    bus.unsubscribe(REPORT_CHANNEL, subscription);

    match err.io_error() {
        Some(io_err) => error!(destination = %destination.display(), "{io_err}"),
        None => error!(destination = %destination.display(), "{err}"),
    }
}
