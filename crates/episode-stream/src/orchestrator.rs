use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument as _, debug, info_span, warn};

use crate::classify::{ClassifiedEvent, classify};
use crate::decode::ByteAccumulator;
use crate::errors::ClientError;
use crate::frame::FrameParser;
use crate::source::ChunkSource;
use crate::state::{GenerationState, ProgressStateMachine};

/// Handle used to cancel a running generation stream.
///
/// Cancellation stops the read loop, closes the source and returns the state
/// as it was; it is not reported as a failure.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Safe to call from inside a state callback.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Drives one generation stream: chunks in, state snapshots out.
///
/// Each orchestrator owns a fresh decoder, parser and state machine and is
/// consumed by `run` or `spawn`.
pub struct StreamOrchestrator {
    run_id: uuid::Uuid,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Default for StreamOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamOrchestrator {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            run_id: uuid::Uuid::new_v4(),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Identifier attached to this run's log events.
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Reads `source` to its end and returns the final state.
    ///
    /// `on_state_change` is called once per processed frame. Source failures
    /// end the run in `Failed` instead of being returned. The source is
    /// closed on every exit path.
    pub async fn run<S, F>(self, source: S, on_state_change: F) -> GenerationState
    where
        S: ChunkSource,
        F: FnMut(&GenerationState) + Send,
    {
        self.drive(source, CallbackObserver(on_state_change)).await
    }

    /// Runs the stream on a background task.
    ///
    /// States are delivered through a channel bounded by `buffer`. Dropping
    /// the returned handle cancels the run and closes the source.
    pub fn spawn<S>(self, source: S, buffer: usize) -> GenerationRun
    where
        S: ChunkSource + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let run_id = self.run_id;
        let cancel = self.cancel_handle();
        let task = tokio::spawn(self.drive(source, ChannelObserver { tx }));
        GenerationRun {
            run_id,
            rx,
            cancel: CancelOnDrop(cancel),
            task,
        }
    }

    async fn drive<S, O>(self, source: S, observer: O) -> GenerationState
    where
        S: ChunkSource,
        O: StateObserver,
    {
        let span = info_span!("generation_stream", run_id = %self.run_id);
        self.read_loop(source, observer).instrument(span).await
    }

    async fn read_loop<S, O>(self, mut source: S, mut observer: O) -> GenerationState
    where
        S: ChunkSource,
        O: StateObserver,
    {
        let mut cancel_rx = self.cancel_rx;
        let mut pipeline = FramePipeline::default();
        debug!("generation stream started");

        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = wait_cancelled(&mut cancel_rx) => None,
                next = source.next_chunk() => Some(next),
            };
            let Some(next) = next else {
                break Outcome::Cancelled;
            };

            match next {
                Ok(Some(chunk)) => {
                    let text = pipeline.decoder.feed(&chunk);
                    if let Some(outcome) = pipeline.process(&text, &cancel_rx, &mut observer).await {
                        break outcome;
                    }
                }
                Ok(None) => {
                    let text = pipeline.decoder.finish();
                    if let Some(outcome) = pipeline.process(&text, &cancel_rx, &mut observer).await {
                        break outcome;
                    }
                    break Outcome::Ended;
                }
                Err(err) => {
                    warn!(error = %err, "generation stream source failed");
                    let failed = ClassifiedEvent::Failed {
                        message: err.to_string(),
                    };
                    if let Some(outcome) = pipeline.deliver(failed, &cancel_rx, &mut observer).await {
                        break outcome;
                    }
                    break Outcome::SourceFailed;
                }
            }
        };

        source.close().await;

        let pending = pipeline.parser.pending().len();
        let state = pipeline.machine.into_state();
        match outcome {
            Outcome::Ended if !state.is_terminal() => {
                warn!(status = ?state.status, "generation stream ended without a terminal event");
            }
            Outcome::Cancelled => debug!("generation stream cancelled"),
            Outcome::ObserverGone => debug!("state consumer dropped, stopping"),
            _ => {}
        }
        if pending > 0 {
            debug!(pending_bytes = pending, "dropping unterminated trailing frame");
        }
        debug!(
            frames = pipeline.frames,
            status = ?state.status,
            percent = state.percent,
            "generation stream finished"
        );
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ended,
    SourceFailed,
    Cancelled,
    ObserverGone,
}

#[derive(Default)]
struct FramePipeline {
    decoder: ByteAccumulator,
    parser: FrameParser,
    machine: ProgressStateMachine,
    frames: u64,
}

impl FramePipeline {
    /// Parses `text` and delivers every completed frame. Returns an outcome
    /// when the loop has to stop.
    async fn process<O: StateObserver>(
        &mut self,
        text: &str,
        cancel_rx: &watch::Receiver<bool>,
        observer: &mut O,
    ) -> Option<Outcome> {
        if text.is_empty() {
            return None;
        }
        for frame in self.parser.push(text) {
            if let Some(outcome) = self.deliver(classify(frame), cancel_rx, observer).await {
                return Some(outcome);
            }
        }
        None
    }

    async fn deliver<O: StateObserver>(
        &mut self,
        event: ClassifiedEvent,
        cancel_rx: &watch::Receiver<bool>,
        observer: &mut O,
    ) -> Option<Outcome> {
        if is_cancelled(cancel_rx) {
            return Some(Outcome::Cancelled);
        }
        self.frames += 1;
        self.machine.apply(event);
        if !observer.notify(self.machine.state()).await {
            return Some(Outcome::ObserverGone);
        }
        None
    }
}

fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Every handle is gone, so cancellation can no longer arrive.
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait::async_trait]
trait StateObserver: Send {
    /// Returns false once the observer no longer wants states.
    async fn notify(&mut self, state: &GenerationState) -> bool;
}

struct CallbackObserver<F>(F);

#[async_trait::async_trait]
impl<F> StateObserver for CallbackObserver<F>
where
    F: FnMut(&GenerationState) + Send,
{
    async fn notify(&mut self, state: &GenerationState) -> bool {
        (self.0)(state);
        true
    }
}

struct ChannelObserver {
    tx: mpsc::Sender<GenerationState>,
}

#[async_trait::async_trait]
impl StateObserver for ChannelObserver {
    async fn notify(&mut self, state: &GenerationState) -> bool {
        self.tx.send(state.clone()).await.is_ok()
    }
}

/// Handle to a generation stream running on a background task.
///
/// Dropping it cancels the run.
pub struct GenerationRun {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<GenerationState>,
    cancel: CancelOnDrop,
    task: JoinHandle<GenerationState>,
}

struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl GenerationRun {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.0.clone()
    }

    /// Waits for the state produced by the next frame.
    ///
    /// Returns `None` once the run has stopped.
    pub async fn next_state(&mut self) -> Option<GenerationState> {
        self.rx.recv().await
    }

    /// Drains remaining states and returns the final one.
    pub async fn finish(mut self) -> Result<GenerationState, ClientError> {
        while self.rx.recv().await.is_some() {}
        self.task.await.map_err(|e| {
            ClientError::Task(format!("generation run {} ended abnormally: {e}", self.run_id))
        })
    }
}
