//! The in-memory description of the tree to be written into an image.
//!
//! [`FileInput`] is filled in by the caller (either by hand, or by walking a
//! directory with [`FileInput::from_fs`]) and handed to [`crate::IsoImage::format_new`]
//! or [`crate::IsoImage::format_file`].

use std::borrow::Cow;
use std::path::Path;

/// The source of a single file's bytes.
#[derive(Debug, Clone)]
pub enum FileData {
    /// A directory; the names of its direct children (not full paths).
    Directory(Vec<String>),
    /// Data held entirely in memory, e.g. synthesized boot catalogues.
    Data(Vec<u8>),
    /// A file that should be read from the local filesystem at write time.
    Disk(std::path::PathBuf),
}

impl FileData {
    pub fn get_data(&self) -> Cow<'_, [u8]> {
        match self {
            FileData::Directory(_) => Cow::Borrowed(&[]),
            FileData::Data(data) => Cow::Borrowed(data),
            FileData::Disk(path) => Cow::Owned(
                std::fs::read(path)
                    .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display())),
            ),
        }
    }
}

/// A single entry in the tree, identified by its full `/`-separated path
/// relative to the root (the root directory itself has an empty path).
#[derive(Debug, Clone)]
pub struct File {
    pub path: String,
    pub data: FileData,
}

impl File {
    pub fn is_directory(&self) -> bool {
        matches!(self.data, FileData::Directory(_))
    }

    pub fn get_data(&self) -> Cow<'_, [u8]> {
        self.data.get_data()
    }

    /// The names of the direct children of this entry. Only meaningful for
    /// directories; returns an empty slice otherwise.
    pub fn get_children(&self) -> &[String] {
        match &self.data {
            FileData::Directory(children) => children,
            _ => &[],
        }
    }
}

/// The full set of files and directories that make up an image, in no
/// particular order; [`FileWriter`](crate::FileWriter) is responsible for
/// ordering them for writing.
#[derive(Debug, Clone, Default)]
pub struct FileInput {
    files: Vec<File>,
}

impl FileInput {
    pub fn empty() -> Self {
        Self { files: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn append(&mut self, file: File) {
        self.files.push(file);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Splits the tree into directories and plain files, which
    /// [`FileWriter`](crate::FileWriter) writes in two separate passes.
    pub fn split(self) -> (Vec<File>, Vec<File>) {
        self.files.into_iter().partition(|f| f.is_directory())
    }

    /// Walks a directory on the local filesystem and builds a [`FileInput`]
    /// from it. Entries within each directory are sorted by name so that
    /// path table ordering is deterministic.
    pub fn from_fs(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref();
        let mut files = Vec::new();
        Self::walk(root, "", &mut files)?;
        Ok(Self { files })
    }

    fn walk(disk_path: &Path, rel_path: &str, out: &mut Vec<File>) -> std::io::Result<()> {
        let mut children: Vec<_> = std::fs::read_dir(disk_path)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|entry| entry.file_name());

        let mut names = Vec::with_capacity(children.len());
        for entry in &children {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        out.push(File {
            path: rel_path.to_string(),
            data: FileData::Directory(names),
        });

        for entry in children {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel_path = if rel_path.is_empty() {
                name
            } else {
                format!("{rel_path}/{name}")
            };
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                Self::walk(&entry.path(), &child_rel_path, out)?;
            } else {
                out.push(File {
                    path: child_rel_path,
                    data: FileData::Disk(entry.path()),
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FileInput {
    type Item = &'a File;
    type IntoIter = std::slice::Iter<'a, File>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
