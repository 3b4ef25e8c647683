//! Chunk transports
//!
//! The upload worker hands each chunk to a [`ChunkTransport`]. The default
//! implementation POSTs it with reqwest; tests plug in simulated transports.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};

use crate::constants::{FORM_FILE_FIELD, UPLOAD_SLICE_SIZE, WEBM_MIME_TYPE};
use crate::error::UploadError;
use crate::upload::settings::{PostMode, UploadTarget};
use crate::upload::stats::TransferProgress;

/// Sends one chunk to its destination
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Transfer `chunk`, reporting bytes handed to the network through
    /// `progress`. Dropping the returned future aborts the transfer.
    async fn send(&self, chunk: Bytes, progress: TransferProgress) -> Result<(), UploadError>;
}

/// HTTP POST transport
pub struct HttpTransport {
    client: Client,
    target: UploadTarget,
}

impl HttpTransport {
    pub fn new(target: UploadTarget) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(target.connect_timeout)
            .user_agent(concat!("webmlive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::TransportInitFailed(e.to_string()))?;

        Ok(Self { client, target })
    }

    /// Stream `chunk` in slices so progress advances as the connection
    /// pulls data.
    fn progress_body(chunk: Bytes, progress: TransferProgress) -> Body {
        let slices: Vec<Bytes> = (0..chunk.len())
            .step_by(UPLOAD_SLICE_SIZE)
            .map(|start| chunk.slice(start..(start + UPLOAD_SLICE_SIZE).min(chunk.len())))
            .collect();

        let body = stream::iter(slices).map(move |slice| {
            progress.advance(slice.len() as u64);
            Ok::<_, std::io::Error>(slice)
        });
        Body::wrap_stream(body)
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send(&self, chunk: Bytes, progress: TransferProgress) -> Result<(), UploadError> {
        let length = chunk.len();
        let body = Self::progress_body(chunk, progress);
        let request = self.client.post(self.target.url.clone());

        let request = match self.target.post_mode {
            PostMode::Raw => request
                .header(CONTENT_TYPE, WEBM_MIME_TYPE)
                .header(CONTENT_LENGTH, length)
                .body(body),
            PostMode::Form => {
                let part = Part::stream_with_length(body, length as u64)
                    .file_name(self.target.file_name.clone())
                    .mime_str(WEBM_MIME_TYPE)
                    .map_err(|e| UploadError::TransportTransferFailed(e.to_string()))?;

                let form = self
                    .target
                    .form_variables
                    .iter()
                    .fold(Form::new(), |form, (name, value)| {
                        form.text(name.clone(), value.clone())
                    })
                    .part(FORM_FILE_FIELD, part);
                request.multipart(form)
            }
        };
        // User headers win over the defaults above
        let request = request.headers(self.target.headers.clone());

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::TransportTransferFailed(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("upload rejected with {}: {}", status, body);
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
            });
        }

        // Drain the response so the connection can be reused
        response
            .bytes()
            .await
            .map_err(|e| UploadError::TransportTransferFailed(e.to_string()))?;
        Ok(())
    }
}
