// Chunked JSON streaming utilities
use crate::infrastructure::http_response::brotli_compress;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;

/// Create a chunked streaming response, one length-prefixed JSON message per item
pub fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    let byte_stream = stream.then(move |msg| async move { serialize_chunk(&msg, compress).await });

    // Chunks are compressed individually, so no Content-Encoding on the
    // response itself.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// 4-byte big-endian length followed by the (optionally Brotli) JSON payload
pub async fn serialize_chunk<T: Serialize>(msg: &T, compress: bool) -> std::io::Result<Bytes> {
    let json = serde_json::to_vec(msg)?;
    let payload = if compress {
        brotli_compress(json).await?
    } else {
        json
    };

    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    Ok(chunk.freeze())
}

/// Stream every message from a broadcast receiver until the sender closes.
/// A slow client skips what it missed instead of holding the sender back.
pub fn stream_from_broadcast<T>(mut rx: broadcast::Receiver<T>, compress: bool) -> impl IntoResponse
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(msg) => yield msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Stream client lagged, skipped {} messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    match chunked_json_stream(stream, compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
