//! Attachment storage under the content root.
//!
//! Binary blobs (images and similar) are stored as
//! `files/{base}_{disambiguator}.{ext}` and referenced through a
//! root-relative public URL. The disambiguator makes collisions structurally
//! impossible rather than a runtime error class.

use std::error::Error as StdError;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, pin_mut, stream};
use slug::slugify;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};

/// Attempts to find a free target when the default disambiguator races
/// another save of the same name within the same nanosecond.
const MAX_DISAMBIGUATION_ATTEMPTS: usize = 8;

/// Errors that can occur while interacting with attachment storage.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("invalid attachment path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("attachment payload stream failed")]
    PayloadStream {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("attachment payload is empty")]
    EmptyPayload,
}

/// Filesystem-backed attachment storage rooted at the content root.
#[derive(Debug)]
pub struct AttachmentStore {
    root: PathBuf,
    public_prefix: String,
}

impl AttachmentStore {
    /// Initialise storage rooted at the provided directory, creating it if
    /// necessary. `public_prefix` is the root-relative URL segment under
    /// which the content root is served, e.g. `/posts`.
    pub fn new(root: PathBuf, public_prefix: impl Into<String>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        let mut public_prefix = public_prefix.into();
        while public_prefix.ends_with('/') {
            public_prefix.pop();
        }
        Ok(Self {
            root,
            public_prefix,
        })
    }

    /// Store a fully-buffered payload and return its public URL.
    pub async fn save(
        &self,
        data: Bytes,
        file_name: &str,
        disambiguator: Option<&str>,
    ) -> Result<String, AttachmentError> {
        let stream = stream::once(async move { Ok::<_, AttachmentError>(data) });
        self.save_stream(stream, file_name, disambiguator).await
    }

    /// Store a streamed payload and return its public URL.
    ///
    /// The payload is written to disk chunk by chunk; a failed or empty
    /// stream removes the partial file. The target is opened with
    /// `create_new`, so an existing file is never overwritten: with the
    /// default timestamp disambiguator a collision triggers a bounded retry
    /// with a fresh timestamp, while an explicitly supplied disambiguator
    /// that collides is a caller error and propagates as `Io`.
    pub async fn save_stream<S>(
        &self,
        stream: S,
        file_name: &str,
        disambiguator: Option<&str>,
    ) -> Result<String, AttachmentError>
    where
        S: futures::Stream<Item = Result<Bytes, AttachmentError>>,
    {
        let (relative, mut file) = self.create_target(file_name, disambiguator).await?;
        let absolute = self.resolve(&relative)?;

        let mut saw_payload = false;

        pin_mut!(stream);
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    let _ = fs::remove_file(&absolute).await;
                    return Err(err);
                }
            };

            if chunk.is_empty() {
                continue;
            }

            saw_payload = true;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        if !saw_payload {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(AttachmentError::EmptyPayload);
        }

        Ok(format!("{}/{relative}", self.public_prefix))
    }

    /// Read a stored attachment into memory. Accepts either the public URL
    /// returned by `save` or the bare root-relative path.
    pub async fn read(&self, reference: &str) -> Result<Bytes, AttachmentError> {
        let absolute = self.resolve(self.strip_prefix(reference))?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored attachment. Missing files are treated as success.
    pub async fn delete(&self, reference: &str) -> Result<(), AttachmentError> {
        let absolute = self.resolve(self.strip_prefix(reference))?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AttachmentError::Io(err)),
        }
    }

    async fn create_target(
        &self,
        file_name: &str,
        disambiguator: Option<&str>,
    ) -> Result<(String, fs::File), AttachmentError> {
        let mut attempts = 0;
        loop {
            let suffix = match disambiguator {
                Some(value) => value.to_string(),
                None => timestamp_disambiguator(),
            };
            let relative = build_relative_path(file_name, &suffix);
            let absolute = self.resolve(&relative)?;

            if let Some(parent) = absolute.parent() {
                fs::create_dir_all(parent).await?;
            }

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => return Ok((relative, file)),
                Err(err)
                    if err.kind() == std::io::ErrorKind::AlreadyExists
                        && disambiguator.is_none()
                        && attempts < MAX_DISAMBIGUATION_ATTEMPTS =>
                {
                    attempts += 1;
                }
                Err(err) => return Err(AttachmentError::Io(err)),
            }
        }
    }

    fn strip_prefix<'a>(&self, reference: &'a str) -> &'a str {
        reference
            .strip_prefix(&self.public_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(reference)
    }

    /// Resolve the absolute filesystem path for a stored attachment,
    /// rejecting absolute and parent-traversing references.
    fn resolve(&self, relative: &str) -> Result<PathBuf, AttachmentError> {
        let relative = Path::new(relative);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(AttachmentError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn build_relative_path(file_name: &str, disambiguator: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("attachment");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "attachment".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("files/{base}_{disambiguator}.{ext}"),
        None => format!("files/{base}_{disambiguator}"),
    }
}

fn timestamp_disambiguator() -> String {
    OffsetDateTime::now_utc().unix_timestamp_nanos().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_keeps_extension_and_slugs_base() {
        let relative = build_relative_path("Holiday Photo.JPG", "123");
        assert_eq!(relative, "files/holiday-photo_123.jpg");
    }

    #[test]
    fn relative_path_survives_missing_extension() {
        let relative = build_relative_path("notes", "7");
        assert_eq!(relative, "files/notes_7");
    }

    #[tokio::test]
    async fn traversal_references_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AttachmentStore::new(dir.path().to_path_buf(), "/posts").expect("store");

        let err = store.read("../outside.txt").await.expect_err("traversal");
        assert!(matches!(err, AttachmentError::InvalidPath));
    }
}
