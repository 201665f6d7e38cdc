//! Common imports for typical client usage.
pub use crate::{
    ArtStyle, CancelHandle, ChunkSource, ClientConfig, ClientError, EpisodeRequest,
    GenerationClient, GenerationMode, GenerationRun, GenerationState, GenerationStatus,
    Resolution, SourceError, StreamOrchestrator,
};
