//! Filesystem-backed transport.
//!
//! Provides [`FileTransport`], a [`Transport`](crate::Transport)
//! implementation that writes every delivered message as an `.eml` file
//! under a base directory, handy for inspecting staging traffic.

use std::path::{Path, PathBuf};

use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{EmailMessage, Transport, TransportError, TransportFuture};

/// Transport that stores emails as `.eml` files in a directory.
pub struct FileTransport {
    base_path: PathBuf,
}

impl FileTransport {
    /// Creates a new [`FileTransport`] writing into the given directory.
    ///
    /// The directory is created on first delivery.
    pub fn new(base_path: PathBuf) -> Self {
        info!(path = %base_path.display(), "File transport initialized");
        Self { base_path }
    }

    /// Returns the directory messages are written to.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn write(&self, message: &EmailMessage) -> Result<PathBuf, TransportError> {
        fs::create_dir_all(&self.base_path).await?;
        let path = self.base_path.join(format!("{}.eml", Uuid::new_v4()));
        let mut file = File::create(&path).await?;
        file.write_all(message.to_raw().as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }
}

impl Transport for FileTransport {
    fn deliver_now<'a>(&'a self, message: &'a EmailMessage) -> TransportFuture<'a> {
        Box::pin(async move {
            debug!(
                message_id = %message.message_id,
                path = %self.base_path.display(),
                "Writing email to filesystem"
            );
            let path = self.write(message).await.map_err(|e| {
                error!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to write email to filesystem"
                );
                e
            })?;
            info!(
                message_id = %message.message_id,
                path = %path.display(),
                "Stored email to filesystem"
            );
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}
