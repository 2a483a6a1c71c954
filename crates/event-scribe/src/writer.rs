use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Flush the writer after this many seconds without new lines.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// Errors that can occur during event log I/O.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to open event log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to event log: {0}")]
    Write(#[source] io::Error),

    #[error("failed to flush event log: {0}")]
    Flush(#[source] io::Error),

    #[error("failed to close event log: {0}")]
    Close(#[source] io::Error),

    #[error("event log writer task ended abnormally: {0}")]
    Task(#[source] tokio::task::JoinError),
}

impl WriteError {
    /// The underlying I/O error, if this failure came from the byte sink.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            WriteError::Open { source, .. } => Some(source),
            WriteError::Write(err) | WriteError::Flush(err) | WriteError::Close(err) => Some(err),
            WriteError::Task(_) => None,
        }
    }
}

/// What a writer did before it finished cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub lines: u64,
    pub bytes: u64,
}

enum Command {
    Line(String),
    End,
}

/// Cloneable producer side of a [`DurableWriter`].
///
/// Neither method blocks or awaits; both only enqueue.
#[derive(Debug, Clone)]
pub struct WriterInput {
    tx: mpsc::UnboundedSender<Command>,
}

impl WriterInput {
    /// Queue one already-delimited line. Returns `false` if the writer no
    /// longer accepts input (ended, or failed).
    pub fn push(&self, line: String) -> bool {
        self.tx.send(Command::Line(line)).is_ok()
    }

    /// Signal that no more lines will be pushed. Lines queued before this
    /// call are still written; the sink is then flushed and closed.
    pub fn end(&self) {
        if self.tx.send(Command::End).is_err() {
            debug!("event log writer already finished");
        }
    }
}

/// Append-only line pipe between event handling and a byte sink.
///
/// A background task owns the sink and writes queued lines in push order
/// through a buffer. It exposes two one-shot signals:
///
/// * the failure signal ([`take_failure`](Self::take_failure)), fired with
///   the first write, flush or close error, which is terminal;
/// * the finished signal ([`finished`](Self::finished)), resolved once the
///   task exits: after end-of-input with everything flushed and the sink
///   closed, or after a failure.
///
/// Dropping every [`WriterInput`] (including the one held here) counts as
/// end-of-input.
pub struct DurableWriter {
    input: WriterInput,
    failure: Option<oneshot::Receiver<Arc<WriteError>>>,
    task: JoinHandle<Result<WriteSummary, Arc<WriteError>>>,
}

impl DurableWriter {
    /// Open (or create) the file at `path` in append mode and spawn the
    /// writer task for it. Existing content is never truncated.
    ///
    /// Parent directories are not created; a missing directory is an open
    /// failure.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        let path = path.as_ref();

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| WriteError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), "event log opened for append");
        Ok(Self::spawn(file))
    }

    /// Spawn the writer task over an arbitrary byte sink.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<W>(sink: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = oneshot::channel();

        let task = tokio::spawn(run_writer_loop(BufWriter::new(sink), rx, failure_tx));

        Self {
            input: WriterInput { tx },
            failure: Some(failure_rx),
            task,
        }
    }

    /// Another producer handle for this writer.
    pub fn input(&self) -> WriterInput {
        self.input.clone()
    }

    pub fn push(&self, line: String) -> bool {
        self.input.push(line)
    }

    pub fn end(&self) {
        self.input.end();
    }

    /// Take the failure signal. Only the first call returns `Some`.
    ///
    /// The receiver yields the terminal error if one occurs, and a
    /// `RecvError` if the writer finishes cleanly instead.
    pub fn take_failure(&mut self) -> Option<oneshot::Receiver<Arc<WriteError>>> {
        self.failure.take()
    }

    /// Wait for the writer task to exit.
    ///
    /// Does not itself end the input: call [`end`](Self::end) (or drop all
    /// inputs) first, or this waits for whoever still holds one.
    pub async fn finished(self) -> Result<WriteSummary, Arc<WriteError>> {
        let Self { input, task, .. } = self;
        drop(input);

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(Arc::new(WriteError::Task(err))),
        }
    }
}

/// Core loop executed inside the background task.
///
/// Writes lines as they arrive and flushes after [`FLUSH_INTERVAL_SECS`] of
/// inactivity. On end-of-input the channel is closed, whatever is already
/// queued is written, and the sink is flushed and shut down.
async fn run_writer_loop<W>(
    mut out: BufWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    failure_tx: oneshot::Sender<Arc<WriteError>>,
) -> Result<WriteSummary, Arc<WriteError>>
where
    W: AsyncWrite + Unpin,
{
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut summary = WriteSummary::default();
    let mut dirty = false;

    let outcome = loop {
        match tokio::time::timeout(flush_interval, rx.recv()).await {
            Ok(Some(Command::Line(line))) => {
                if let Err(err) = out.write_all(line.as_bytes()).await {
                    break Err(WriteError::Write(err));
                }
                summary.lines += 1;
                summary.bytes += line.len() as u64;
                dirty = true;
            }
            // Stop accepting input but keep draining what is queued.
            Ok(Some(Command::End)) => rx.close(),
            Ok(None) => break close(&mut out).await,
            Err(_) => {
                if dirty {
                    if let Err(err) = out.flush().await {
                        break Err(WriteError::Flush(err));
                    }
                    dirty = false;
                }
            }
        }
    };

    match outcome {
        Ok(()) => {
            debug!(
                lines = summary.lines,
                bytes = summary.bytes,
                "event log writer finished"
            );
            Ok(summary)
        }
        Err(err) => {
            let err = Arc::new(err);

            rx.close();
            let mut discarded = 0u64;
            while let Ok(command) = rx.try_recv() {
                if matches!(command, Command::Line(_)) {
                    discarded += 1;
                }
            }
            if discarded > 0 {
                warn!(discarded, "event log writer failed; queued lines discarded");
            }

            debug!(%err, "event log writer stopped after failure");
            if failure_tx.send(Arc::clone(&err)).is_err() {
                debug!("nobody is listening for event log failures");
            }
            Err(err)
        }
    }
}

async fn close<W: AsyncWrite + Unpin>(out: &mut BufWriter<W>) -> Result<(), WriteError> {
    out.flush().await.map_err(WriteError::Flush)?;
    out.shutdown().await.map_err(WriteError::Close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Byte sink whose every operation fails.
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("mock error")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("mock error")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_lines_in_push_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        let writer = DurableWriter::open(&path).await.unwrap();
        for i in 0..100 {
            assert!(writer.push(format!("line {i}\n")));
        }
        writer.end();
        let summary = writer.finished().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let expected: String = (0..100).map(|i| format!("line {i}\n")).collect();
        assert_eq!(contents, expected);
        assert_eq!(summary.lines, 100);
        assert_eq!(summary.bytes, expected.len() as u64);
    }

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        std::fs::write(&path, "earlier\n").unwrap();

        let writer = DurableWriter::open(&path).await.unwrap();
        writer.push("later\n".to_owned());
        writer.end();
        writer.finished().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }

    #[tokio::test]
    async fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("events.log");

        let err = DurableWriter::open(&path).await.err().unwrap();
        assert!(matches!(err, WriteError::Open { .. }), "unexpected error: {err}");
        assert_eq!(err.io_error().unwrap().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn dropping_inputs_finishes_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        let writer = DurableWriter::open(&path).await.unwrap();
        let input = writer.input();
        input.push("only\n".to_owned());
        drop(input);

        let summary = writer.finished().await.unwrap();
        assert_eq!(summary.lines, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "only\n");
    }

    #[tokio::test]
    async fn push_after_finish_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DurableWriter::open(dir.path().join("events.log"))
            .await
            .unwrap();
        let input = writer.input();
        writer.end();

        // Hold the extra input so `finished` relies on the end signal.
        writer.finished().await.unwrap();
        assert!(!input.push("late\n".to_owned()));
        assert!(format!("{input:?}").starts_with("WriterInput"));
    }

    #[tokio::test]
    async fn failure_is_signalled_once_and_is_terminal() {
        let mut writer = DurableWriter::spawn(BrokenSink);
        let failure = writer.take_failure().unwrap();
        assert!(writer.take_failure().is_none());

        writer.push("doomed\n".to_owned());
        writer.end();

        let signalled = failure.await.unwrap();
        assert_eq!(signalled.io_error().unwrap().to_string(), "mock error");

        let err = writer.finished().await.unwrap_err();
        assert!(matches!(*err, WriteError::Flush(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn clean_finish_closes_failure_signal_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DurableWriter::open(dir.path().join("events.log"))
            .await
            .unwrap();
        let failure = writer.take_failure().unwrap();

        writer.end();
        writer.finished().await.unwrap();
        assert!(failure.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_flush_surfaces_failure_without_end() {
        let mut writer = DurableWriter::spawn(BrokenSink);
        let failure = writer.take_failure().unwrap();

        writer.push("buffered\n".to_owned());

        // Paused time auto-advances to the idle flush.
        let err = failure.await.unwrap();
        assert!(matches!(*err, WriteError::Flush(_)));
        assert!(!writer.push("after failure\n".to_owned()));
    }
}
