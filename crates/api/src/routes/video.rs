//! Annotated video: single JPEG snapshot and MJPEG stream

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use video_stream::multipart;

use crate::{ApiError, AppState};

/// Latest annotated frame as JPEG, 204 before the first frame
pub async fn snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    let renderer = state.renderer.clone();
    let jpeg = tokio::task::spawn_blocking(move || renderer.render_latest()).await??;

    Ok(match jpeg {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Endless multipart MJPEG stream
///
/// Rendering runs on a blocking thread and ends when the client goes away
/// or the process stops.
pub async fn video_feed(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(2);
    let frames = state.renderer.frames(state.stop.clone());

    tokio::task::spawn_blocking(move || {
        metrics::gauge!("stream_clients").increment(1.0);
        for jpeg in frames {
            if tx.blocking_send(Ok(Bytes::from(multipart::jpeg_part(&jpeg)))).is_err() {
                break;
            }
        }
        metrics::gauge!("stream_clients").decrement(1.0);
        tracing::debug!("Video stream closed");
    });

    (
        [
            (header::CONTENT_TYPE, multipart::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}
