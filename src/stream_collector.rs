use crate::error::PipelineError;
use futures::{Stream, StreamExt};
use std::io;

/// Reads a body stream to the end and decodes it as UTF-8.
///
/// Chunks are concatenated in arrival order. On a stream error nothing
/// collected so far is returned. Bytes that are not UTF-8 (8bit parts in
/// another charset) become U+FFFD; base64 payloads are ASCII and survive.
pub async fn collect_text<S>(mut stream: S) -> Result<String, PipelineError>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Unpin,
{
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            PipelineError::Stream(format!(
                "body stream failed after {} bytes: {}",
                buffer.len(),
                e
            ))
        })?;
        buffer.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
