//! Streaming progress client for episode generation.
//!
//! A generation request answers with a server-sent event stream. This crate
//! decodes the body chunk by chunk (`decode`), splits it into frames
//! (`frame`), classifies each frame (`classify`) and folds the events into a
//! `GenerationState` (`state`). `orchestrator` ties the pieces to a
//! `ChunkSource` and reports every intermediate state.
//!
//! # Usage
//!
//! ```no_run
//! use episode_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = GenerationClient::new(ClientConfig::new("http://localhost:3000/api/v1"))?;
//! let request = EpisodeRequest::new(
//!     "A robot learns to paint.",
//!     serde_json::json!({"_id": "character-1"}),
//!     "user-1",
//! );
//!
//! let state = client
//!     .generate(&request, |state| {
//!         println!("{:>3}% {}", state.percent, state.latest_message().unwrap_or(""));
//!     })
//!     .await?;
//!
//! match state.status {
//!     GenerationStatus::Completed => println!("done: {:?}", state.final_payload),
//!     GenerationStatus::Failed => eprintln!("failed: {:?}", state.error),
//!     _ => eprintln!("stream ended early"),
//! }
//! # Ok(())
//! # }
//! ```

/// Frame classification into semantic events.
pub mod classify;
/// Client configuration.
pub mod config;
/// Incremental UTF-8 decoding of body chunks.
pub mod decode;
/// Public error types.
pub mod errors;
/// Event-stream frame parsing.
pub mod frame;
/// reqwest-backed generation client and chunk source.
pub mod http;
/// Tracing subscriber setup for binaries and tests.
pub mod observability;
/// Read loop, cancellation and spawned runs.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Generation request body.
pub mod request;
/// Chunk source abstraction.
pub mod source;
/// Progress state machine.
pub mod state;

pub use classify::{ClassifiedEvent, classify};
pub use config::ClientConfig;
pub use decode::ByteAccumulator;
pub use errors::{ClientError, SourceError};
pub use frame::{FrameParser, RawFrame};
pub use http::{GenerationClient, HttpChunkSource};
pub use orchestrator::{CancelHandle, GenerationRun, StreamOrchestrator};
pub use request::{ArtStyle, EpisodeRequest, GenerationMode, Resolution};
pub use source::{ChunkSource, StreamSource};
pub use state::{GenerationState, GenerationStatus, ProgressStateMachine};
