//! Mapping of virtual paths to files on disk.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use catalog_common::{CatalogError, CatalogResult, FileRef};

/// How virtual paths are laid out under the root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// Files live at `root/<blake3(virtual path)>`.
    ContentAddressed,
    /// Files live at `root/<virtual path>`, mirroring a watched tree.
    Mirrored,
}

/// Stable hex identifier of a virtual path.
pub fn path_id(virtual_path: &str) -> String {
    blake3::hash(virtual_path.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone)]
pub struct FileService {
    root: PathBuf,
    layout: FileLayout,
    namespace: Option<String>,
}

impl FileService {
    pub fn new(root: impl Into<PathBuf>, layout: FileLayout) -> Self {
        Self {
            root: root.into(),
            layout,
            namespace: None,
        }
    }

    /// Key this service's catalog rows under `namespace/`, so several
    /// services can share one catalog without colliding.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into().trim_matches('/').to_string();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The virtual path inside this service for a catalog key, if the key
    /// carries this service's namespace.
    pub fn strip_namespace<'a>(&self, catalog_key: &'a str) -> Option<&'a str> {
        let namespace = self.namespace.as_deref()?;
        catalog_key
            .trim_start_matches('/')
            .strip_prefix(namespace)?
            .strip_prefix('/')
    }

    pub fn content_addressed(root: impl Into<PathBuf>) -> Self {
        Self::new(root, FileLayout::ContentAddressed)
    }

    pub fn mirrored(root: impl Into<PathBuf>) -> Self {
        Self::new(root, FileLayout::Mirrored)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> FileLayout {
        self.layout
    }

    /// Create the root directory if needed.
    pub async fn ensure_root(&self) -> CatalogResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Derive the file reference for a caller-supplied virtual path.
    ///
    /// Leading slashes are dropped. Empty paths and paths with `.`/`..`
    /// components are rejected.
    pub fn resolve(&self, virtual_path: &str) -> CatalogResult<FileRef> {
        let virtual_path = normalize(virtual_path)?;
        let id = path_id(&virtual_path);

        let real_path = match self.layout {
            FileLayout::ContentAddressed => self.root.join(&id),
            FileLayout::Mirrored => self.root.join(&virtual_path),
        };

        let catalog_key = match &self.namespace {
            Some(namespace) => format!("{}/{}", namespace, virtual_path),
            None => virtual_path.clone(),
        };

        Ok(FileRef {
            virtual_path,
            real_path,
            id,
            catalog_key,
        })
    }

    /// Map a path observed on disk back to its reference (mirrored layout only).
    pub fn from_full_path(&self, full_path: &Path) -> CatalogResult<FileRef> {
        if self.layout != FileLayout::Mirrored {
            return Err(CatalogError::InvalidPath(format!(
                "{} is not addressable in a content-addressed store",
                full_path.display()
            )));
        }

        let relative = full_path.strip_prefix(&self.root).map_err(|_| {
            CatalogError::InvalidPath(format!(
                "{} is outside {}",
                full_path.display(),
                self.root.display()
            ))
        })?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        self.resolve(&parts.join("/"))
    }

    /// Write the reader's contents to the file, replacing any previous file.
    pub async fn save<R>(&self, file: &FileRef, reader: &mut R) -> CatalogResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if let Some(parent) = file.real_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a hidden sibling and rename, so readers never see a partial file.
        let partial = partial_path(&file.real_path);
        let mut out = fs::File::create(&partial).await?;
        let written = tokio::io::copy(reader, &mut out).await?;
        out.flush().await?;
        out.sync_all().await?;
        drop(out);
        fs::rename(&partial, &file.real_path).await?;

        debug!(path = %file.virtual_path, bytes = written, "Saved file");
        Ok(written)
    }

    /// Copy the file's contents into the writer.
    pub async fn read<W>(&self, file: &FileRef, writer: &mut W) -> CatalogResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut input = fs::File::open(&file.real_path)
            .await
            .map_err(|e| not_found_or(e, file))?;
        let copied = tokio::io::copy(&mut input, writer).await?;
        Ok(copied)
    }

    pub async fn delete(&self, file: &FileRef) -> CatalogResult<()> {
        fs::remove_file(&file.real_path)
            .await
            .map_err(|e| not_found_or(e, file))?;
        debug!(path = %file.virtual_path, "Deleted file");
        Ok(())
    }

    pub async fn exists(&self, file: &FileRef) -> bool {
        fs::try_exists(&file.real_path).await.unwrap_or(false)
    }
}

fn not_found_or(err: std::io::Error, file: &FileRef) -> CatalogError {
    if err.kind() == ErrorKind::NotFound {
        CatalogError::FileNotFound(file.virtual_path.clone())
    } else {
        err.into()
    }
}

fn partial_path(real_path: &Path) -> PathBuf {
    let name = real_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    real_path.with_file_name(format!(".{}.partial", name))
}

fn normalize(virtual_path: &str) -> CatalogResult<String> {
    let mut parts = Vec::new();
    for component in Path::new(virtual_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return Err(CatalogError::InvalidPath(virtual_path.to_string())),
        }
    }

    if parts.is_empty() {
        return Err(CatalogError::InvalidPath("empty path".to_string()));
    }
    Ok(parts.join("/"))
}
