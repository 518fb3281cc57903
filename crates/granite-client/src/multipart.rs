//! Multipart form assembly.
//!
//! Parts are collected by the request builder; the encoded body and the
//! boundary are produced at execute time so file reads happen on the async
//! path and their errors surface from `send`, not from the builder.

use bytes::Bytes;
use futures::StreamExt;
use granite_core::{ByteStream, Error};
use rand::Rng;
use std::path::PathBuf;

pub(crate) struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

pub(crate) enum FilePart {
    /// Read from disk at execute time.
    Path { field: String, path: PathBuf },
    /// Streamed content with an explicit file name.
    Reader {
        field: String,
        file_name: String,
        content: ByteStream,
    },
}

impl MultipartForm {
    pub(crate) fn new() -> Self {
        Self {
            fields: Vec::new(),
            files: Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    pub(crate) fn field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub(crate) fn file(&mut self, field: impl Into<String>, path: impl Into<PathBuf>) {
        self.files.push(FilePart::Path {
            field: field.into(),
            path: path.into(),
        });
    }

    pub(crate) fn file_reader(
        &mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        content: ByteStream,
    ) {
        self.files.push(FilePart::Reader {
            field: field.into(),
            file_name: file_name.into(),
            content,
        });
    }

    /// Encodes the form, returning `(content_type, body)`.
    pub(crate) async fn encode(self) -> Result<(String, Bytes), Error> {
        let boundary = generate_boundary();
        let mut body: Vec<u8> = Vec::new();

        for (name, value) in &self.fields {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        for part in self.files {
            let (field, file_name, content) = match part {
                FilePart::Path { field, path } => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "file".to_string());
                    let content = tokio::fs::read(&path).await.map_err(|err| Error::Encode {
                        reason: format!("reading {}: {err}", path.display()),
                    })?;
                    (field, file_name, Bytes::from(content))
                }
                FilePart::Reader {
                    field,
                    file_name,
                    mut content,
                } => {
                    let mut collected = Vec::new();
                    while let Some(chunk) = content.next().await {
                        let chunk = chunk.map_err(|err| Error::Encode {
                            reason: format!("reading multipart stream: {err}"),
                        })?;
                        collected.extend_from_slice(&chunk);
                    }
                    (field, file_name, Bytes::from(collected))
                }
            };

            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(&content);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let content_type = format!("multipart/form-data; boundary={boundary}");
        Ok((content_type, Bytes::from(body)))
    }
}

fn generate_boundary() -> String {
    let mut rng = rand::rng();
    format!(
        "granite{:016x}{:016x}",
        rng.random::<u64>(),
        rng.random::<u64>()
    )
}
