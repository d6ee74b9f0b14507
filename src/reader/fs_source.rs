use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;

use super::ContentStream;
use super::ResourceSource;
use crate::ResourceId;

/// Resolves `id` as a relative path below `root`.
///
/// Absolute ids and ids that climb out of the root (`..`) resolve to `None`.
pub(crate) fn resolve_under(
    root: &Path,
    id: &ResourceId,
) -> Option<PathBuf> {
    let relative = Path::new(id.as_str());
    if id.as_str().is_empty() || relative.is_absolute() {
        return None;
    }

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}

/// Files below a content root
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical path of `id`, if it stays within the content root
    pub fn resolve(
        &self,
        id: &ResourceId,
    ) -> Option<PathBuf> {
        resolve_under(&self.root, id)
    }
}

#[async_trait]
impl ResourceSource for FsSource {
    async fn exists(
        &self,
        id: &ResourceId,
    ) -> bool {
        match self.resolve(id) {
            Some(path) => tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false),
            None => false,
        }
    }

    async fn open(
        &self,
        id: &ResourceId,
    ) -> io::Result<ContentStream> {
        let path = self.resolve(id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{id} is outside the content root"))
        })?;
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }
}
