use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    sync::Arc,
};

/// Provider of directories and file texts.
///
/// Implementations must be deterministic for the duration of a run; listings
/// are returned sorted by name.
pub trait SourceTree {
    fn is_dir(&self, path: &Utf8Path) -> bool;
    fn is_file(&self, path: &Utf8Path) -> bool;

    /// Names of the regular files directly inside `dir`.
    fn files(&self, dir: &Utf8Path) -> io::Result<Vec<String>>;
    /// Names of the directories directly inside `dir`.
    fn dirs(&self, dir: &Utf8Path) -> io::Result<Vec<String>>;

    fn read_file(&self, path: &Utf8Path) -> io::Result<Arc<str>>;
}

impl<T: SourceTree + ?Sized> SourceTree for Box<T> {
    fn is_dir(&self, path: &Utf8Path) -> bool {
        (**self).is_dir(path)
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        (**self).is_file(path)
    }

    fn files(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        (**self).files(dir)
    }

    fn dirs(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        (**self).dirs(dir)
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Arc<str>> {
        (**self).read_file(path)
    }
}

/// Source tree backed by a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskSourceTree {
    root: Utf8PathBuf,
}

impl DiskSourceTree {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn full(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }

    fn list(&self, dir: &Utf8Path, want_dirs: bool) -> io::Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(self.full(dir))? {
            let entry = entry?;
            let file_type = entry.file_type()?;

            let matches = if want_dirs {
                file_type.is_dir()
            } else {
                file_type.is_file()
            };

            if matches {
                match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(name) => log::warn!("Skipping non UTF-8 entry {name:?} in {dir}"),
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

impl SourceTree for DiskSourceTree {
    fn is_dir(&self, path: &Utf8Path) -> bool {
        self.full(path).is_dir()
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        self.full(path).is_file()
    }

    fn files(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        self.list(dir, false)
    }

    fn dirs(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        self.list(dir, true)
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Arc<str>> {
        fs::read_to_string(self.full(path)).map(Arc::from)
    }
}

/// In-memory source tree, directories exist implicitly above every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySourceTree {
    files: BTreeMap<Utf8PathBuf, Arc<str>>,
    dirs: BTreeSet<Utf8PathBuf>,
}

impl MemorySourceTree {
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert(Utf8PathBuf::new());

        Self {
            files: BTreeMap::new(),
            dirs,
        }
    }

    pub fn add_file(&mut self, path: impl Into<Utf8PathBuf>, text: impl Into<Arc<str>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files.insert(path, text.into());
    }

    pub fn add_dir(&mut self, path: impl AsRef<Utf8Path>) {
        let mut current = Some(path.as_ref());
        while let Some(dir) = current {
            self.dirs.insert(dir.to_owned());
            current = dir.parent();
        }
    }

    /// Builder flavour of [`MemorySourceTree::add_file`].
    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>, text: impl Into<Arc<str>>) -> Self {
        self.add_file(path, text);
        self
    }

    fn not_found(path: &Utf8Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{path} not found"))
    }
}

impl Default for MemorySourceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceTree for MemorySourceTree {
    fn is_dir(&self, path: &Utf8Path) -> bool {
        self.dirs.contains(path)
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        self.files.contains_key(path)
    }

    fn files(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        if !self.is_dir(dir) {
            return Err(Self::not_found(dir));
        }

        Ok(self
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name().map(str::to_owned))
            .collect())
    }

    fn dirs(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        if !self.is_dir(dir) {
            return Err(Self::not_found(dir));
        }

        Ok(self
            .dirs
            .iter()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name().map(str::to_owned))
            .collect())
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Arc<str>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }
}
