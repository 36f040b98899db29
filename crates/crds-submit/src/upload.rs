//! Chunked file upload.
//!
//! Files below [`UPLOAD_CHUNK_SIZE`] go up in a single multipart POST.
//! Larger files are sent as consecutive byte ranges, each POST carrying a
//! `Content-Range` header and the CSRF token rotated by the previous chunk's
//! response. Progress is not persisted: a failed upload starts over from
//! byte 0 on the next attempt.

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::csrf::{self, CSRF_FIELD};
use crate::error::{SubmitError, SubmitResult};
use crate::session::Session;
use crate::types::{FilePart, FormFields, Method, RequestBody, UploadReport};

/// Bytes per chunk, and the size at which uploads start being chunked.
pub const UPLOAD_CHUNK_SIZE: u64 = 2_000_000;

/// Endpoint serving both the token-bearing GET and the upload POSTs.
pub const UPLOAD_PATH: &str = "/upload/chunked/";

/// Multipart field carrying file content.
pub const FILE_FIELD: &str = "files";

/// Byte accounting for one upload in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub chunk_size: u64,
    /// Offset of the next byte to send.
    pub start_byte: u64,
    /// Token to send with the next POST.
    pub csrf_token: String,
}

impl UploadState {
    pub fn new(file_path: impl Into<PathBuf>, file_size: u64, csrf_token: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_size,
            chunk_size: UPLOAD_CHUNK_SIZE,
            start_byte: 0,
            csrf_token: csrf_token.into(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Whole file fits below the chunking threshold.
    pub fn is_single_shot(&self) -> bool {
        self.file_size < self.chunk_size
    }

    pub fn is_complete(&self) -> bool {
        self.start_byte >= self.file_size
    }

    /// Length of the next chunk to read.
    pub fn next_len(&self) -> u64 {
        self.chunk_size
            .min(self.file_size.saturating_sub(self.start_byte))
    }

    /// POSTs a chunked upload of this file takes.
    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size)
    }

    /// `Content-Range` value for a chunk of `len` bytes at the current offset.
    pub fn content_range(&self, len: u64) -> String {
        let end = self.start_byte + len.max(1) - 1;
        format!("bytes {}-{}/{}", self.start_byte, end, self.file_size)
    }

    /// Record that `len` bytes went up and, if the server rotated it, the
    /// token for the next chunk.
    pub fn advance(&mut self, len: u64, rotated_token: Option<String>) {
        self.start_byte += len;
        if let Some(token) = rotated_token {
            self.csrf_token = token;
        }
    }
}

impl Session {
    /// Upload the file at `path`, chunking it if it is large.
    ///
    /// Any failing request aborts the whole upload; no partial result is
    /// reported.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> SubmitResult<UploadReport> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| {
                SubmitError::ProtocolState(format!("{} has no usable file name", path.display()))
            })?;

        let form = self.get(UPLOAD_PATH).await?;
        let token = csrf::from_cookie(&form, "upload")?;
        let file_size = tokio::fs::metadata(path).await?.len();
        let mut state = UploadState::new(path, file_size, token);

        if state.is_single_shot() {
            let bytes = tokio::fs::read(path).await?;
            tracing::info!("uploading {} ({} bytes)", file_name, bytes.len());
            let pending = self.runner.start(self.upload_request(&file_name, bytes, &state, None));
            self.post_complete(pending).await?;
            return Ok(UploadReport {
                file_name,
                file_size,
                requests: 1,
            });
        }

        tracing::info!(
            "uploading {} ({} bytes) in {} chunks",
            file_name,
            file_size,
            state.chunk_count()
        );
        let mut file = tokio::fs::File::open(path).await?;
        let mut requests = 0usize;

        while !state.is_complete() {
            let want = state.next_len();
            let mut chunk = Vec::with_capacity(want as usize);
            (&mut file).take(want).read_to_end(&mut chunk).await?;
            if chunk.is_empty() {
                return Err(SubmitError::ProtocolState(format!(
                    "{} ended at byte {} of a declared {}",
                    path.display(),
                    state.start_byte,
                    state.file_size
                )));
            }

            let len = chunk.len() as u64;
            let range = state.content_range(len);
            tracing::debug!("{} {}", file_name, range);

            let pending = self
                .runner
                .start(self.upload_request(&file_name, chunk, &state, Some(range)));
            let response = self.post_complete(pending).await?;
            requests += 1;

            // The next chunk must use the token this response rotated in.
            let more = state.start_byte + len < state.file_size;
            let rotated = if more {
                Some(csrf::from_cookie(&response, "upload chunk")?)
            } else {
                None
            };
            state.advance(len, rotated);
        }

        Ok(UploadReport {
            file_name,
            file_size,
            requests,
        })
    }

    fn upload_request(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        state: &UploadState,
        content_range: Option<String>,
    ) -> crate::types::HttpRequest {
        let fields = FormFields::new().with(CSRF_FIELD, state.csrf_token.clone());
        let file = FilePart {
            field: FILE_FIELD.to_string(),
            file_name: file_name.to_string(),
            bytes,
        };
        let mut request = self.request(Method::Post, UPLOAD_PATH, RequestBody::Multipart { fields, file });
        if let Some(range) = content_range {
            request.headers.push(("Content-Range".to_string(), range));
        }
        request
    }
}
