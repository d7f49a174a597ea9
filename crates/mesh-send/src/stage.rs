//! Attachment staging.
//!
//! Attachments at or above [`STAGE_THRESHOLD_BYTES`] are served from a
//! scoped `axum` static server bound to `127.0.0.1:0` instead of inlined as
//! base64. The server is torn down after a bounded lifetime by a companion
//! sleep task, and can be torn down early by dropping the returned
//! [`StagedAttachment`] guard — both paths notify the same
//! [`tokio::sync::Notify`], so whichever fires first wins.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use mesh_types::Attachment;
use thiserror::Error;
use tokio::sync::Notify;

pub const STAGE_THRESHOLD_BYTES: usize = 64 * 1024;
const STAGE_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to bind staging listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Holds a staged attachment's teardown handle. Dropping it tears the
/// server down immediately; otherwise it tears itself down after
/// [`STAGE_LIFETIME`].
pub struct StagedAttachment {
    pub url: String,
    shutdown: Arc<Notify>,
}

impl Drop for StagedAttachment {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

#[derive(Clone)]
struct FileState {
    bytes: Arc<Vec<u8>>,
    mime_type: Arc<str>,
}

async fn serve_file(State(state): State<FileState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", state.mime_type.to_string())],
        (*state.bytes).clone(),
    )
}

/// Spin up the scoped server for one attachment and return its URL plus a
/// teardown guard. The caller decides how long to hold the guard; the
/// server tears itself down after 5 minutes regardless.
pub async fn stage_attachment(
    bytes: Vec<u8>,
    mime_type: String,
    filename: &str,
) -> Result<StagedAttachment, StageError> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let state = FileState {
        bytes: Arc::new(bytes),
        mime_type: Arc::from(mime_type.as_str()),
    };
    let route = format!("/{filename}");
    let app = Router::new()
        .route(&route, get(serve_file))
        .with_state(state);

    let shutdown = Arc::new(Notify::new());
    let shutdown_wait = {
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    };

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_wait)
            .await
        {
            tracing::warn!("attachment staging server exited with error: {e}");
        }
    });

    let timeout_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(STAGE_LIFETIME).await;
        timeout_shutdown.notify_one();
    });

    Ok(StagedAttachment {
        url: format!("http://{addr}{route}"),
        shutdown,
    })
}

/// Decide how to represent attachment bytes: inline base64 below the
/// threshold, staged URL at or above it. The guard for a staged attachment
/// is returned alongside so the caller can keep it alive as long as it
/// needs (e.g. for the lifetime of a pending conversation round).
pub async fn encode_attachment(
    bytes: Vec<u8>,
    mime_type: String,
    filename: &str,
) -> Result<(Attachment, Option<StagedAttachment>), StageError> {
    if bytes.len() < STAGE_THRESHOLD_BYTES {
        let size = bytes.len() as u64;
        let data = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes);
        Ok((
            Attachment::Inline {
                encoding: "base64".into(),
                data,
                mime_type,
                size,
            },
            None,
        ))
    } else {
        let size = Some(bytes.len() as u64);
        let staged = stage_attachment(bytes, mime_type.clone(), filename).await?;
        let attachment = Attachment::Url {
            url: staged.url.clone(),
            mime_type,
            size,
        };
        Ok((attachment, Some(staged)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn small_attachment_is_inlined() {
        let (attachment, guard) = encode_attachment(b"hello".to_vec(), "text/plain".into(), "f.txt")
            .await
            .unwrap();
        assert!(guard.is_none());
        match attachment {
            Attachment::Inline { data, size, .. } => {
                assert_eq!(size, 5);
                assert!(!data.is_empty());
            }
            other => panic!("expected inline attachment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_attachment_is_staged_and_fetchable() {
        let payload = vec![7u8; STAGE_THRESHOLD_BYTES + 10];
        let (attachment, guard) =
            encode_attachment(payload.clone(), "application/octet-stream".into(), "f.bin")
                .await
                .unwrap();
        let guard = guard.expect("large attachment stages a server");
        let url = match &attachment {
            Attachment::Url { url, .. } => url.clone(),
            other => panic!("expected url attachment, got {other:?}"),
        };

        let resp = reqwest::get(&url).await.unwrap();
        assert!(resp.status().is_success());
        let body = resp.bytes().await.unwrap();
        assert_eq!(body.to_vec(), payload);

        drop(guard);
    }
}
