use crate::traits::AttachmentStore;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Writes attachments to the local filesystem.
///
/// Content goes to a hidden `.part` sibling first and is renamed into place,
/// so a failed write never leaves a truncated file under the final name.
pub struct FileAttachmentStore;

#[async_trait]
impl AttachmentStore for FileAttachmentStore {
    async fn save(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(path);
        if let Err(e) = write_then_rename(&partial, path, contents).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }

        debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}

async fn write_then_rename(partial: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(partial).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(partial, path).await
}
