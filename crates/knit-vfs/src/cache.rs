use camino::{Utf8Path, Utf8PathBuf};
use std::{cell::RefCell, collections::HashMap, io, sync::Arc};

use crate::SourceTree;

type Cached<T> = Result<T, (io::ErrorKind, String)>;

fn store<T: Clone>(result: io::Result<T>) -> Cached<T> {
    result.map_err(|e| (e.kind(), e.to_string()))
}

fn restore<T: Clone>(cached: &Cached<T>) -> io::Result<T> {
    cached
        .clone()
        .map_err(|(kind, message)| io::Error::new(kind, message))
}

/// Memoizes every query of the wrapped tree per path, failures included.
#[derive(Debug)]
pub struct CachedSourceTree<T> {
    inner: T,
    is_dir: RefCell<HashMap<Utf8PathBuf, bool>>,
    is_file: RefCell<HashMap<Utf8PathBuf, bool>>,
    files: RefCell<HashMap<Utf8PathBuf, Cached<Vec<String>>>>,
    dirs: RefCell<HashMap<Utf8PathBuf, Cached<Vec<String>>>>,
    texts: RefCell<HashMap<Utf8PathBuf, Cached<Arc<str>>>>,
}

impl<T: SourceTree> CachedSourceTree<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            is_dir: RefCell::default(),
            is_file: RefCell::default(),
            files: RefCell::default(),
            dirs: RefCell::default(),
            texts: RefCell::default(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: SourceTree> SourceTree for CachedSourceTree<T> {
    fn is_dir(&self, path: &Utf8Path) -> bool {
        *self
            .is_dir
            .borrow_mut()
            .entry(path.to_owned())
            .or_insert_with(|| self.inner.is_dir(path))
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        *self
            .is_file
            .borrow_mut()
            .entry(path.to_owned())
            .or_insert_with(|| self.inner.is_file(path))
    }

    fn files(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        let mut cache = self.files.borrow_mut();
        let entry = cache
            .entry(dir.to_owned())
            .or_insert_with(|| store(self.inner.files(dir)));
        restore(entry)
    }

    fn dirs(&self, dir: &Utf8Path) -> io::Result<Vec<String>> {
        let mut cache = self.dirs.borrow_mut();
        let entry = cache
            .entry(dir.to_owned())
            .or_insert_with(|| store(self.inner.dirs(dir)));
        restore(entry)
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Arc<str>> {
        let mut cache = self.texts.borrow_mut();
        let entry = cache.entry(path.to_owned()).or_insert_with(|| {
            log::trace!("Reading {path}");
            store(self.inner.read_file(path))
        });
        restore(entry)
    }
}
