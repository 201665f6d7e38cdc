use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;

use crate::errors::SourceError;

/// Pull-based source of raw response body chunks.
///
/// Implementations must release their underlying handle both in `close` and
/// on drop, so a run that unwinds still frees the connection.
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    /// Returns the next chunk, or `None` once the body has ended.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError>;

    /// Releases the underlying reader. Calling it twice is harmless.
    async fn close(&mut self);
}

#[async_trait::async_trait]
impl<T: ChunkSource + ?Sized> ChunkSource for Box<T> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        (**self).next_chunk().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

type BoxedByteStream<E> = Pin<Box<dyn futures::Stream<Item = Result<Bytes, E>> + Send>>;

/// Adapts any stream of byte results into a `ChunkSource`.
///
/// Stream errors become `SourceError::Read`. After `close` the stream is
/// dropped and the source reports end-of-stream.
pub struct StreamSource<E> {
    stream: Option<BoxedByteStream<E>>,
}

impl<E> StreamSource<E>
where
    E: Display + Send + 'static,
{
    pub fn new<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self {
            stream: Some(Box::pin(stream)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

#[async_trait::async_trait]
impl<E> ChunkSource for StreamSource<E>
where
    E: Display + Send + 'static,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(SourceError::read(e.to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.stream = None;
    }
}
