//! Local filesystem access.
//!
//! [`GuardedFs`] wraps a filesystem (normally `dav_server`'s `LocalFs`) and,
//! when it is read-only, refuses every operation that would change the
//! store. Refused calls never reach the wrapped filesystem and fail with
//! `FsError::Forbidden`, which the WebDAV engine turns into its usual
//! `403 Forbidden` reply.

use std::path::Path;

use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsStream, OpenOptions,
    ReadDirMeta,
};
use dav_server::localfs::LocalFs;
use futures_util::{future, FutureExt};

/// Filesystem wrapper that can be switched to read-only.
#[derive(Clone)]
pub struct GuardedFs<FS> {
    inner: FS,
    read_only: bool,
}

impl<FS> GuardedFs<FS> {
    pub fn new(inner: FS, read_only: bool) -> GuardedFs<FS> {
        GuardedFs { inner, read_only }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl GuardedFs<LocalFs> {
    /// Serve the directory `root`, read-only unless `writable` is set.
    pub fn local(root: impl AsRef<Path>, writable: bool) -> Box<GuardedFs<LocalFs>> {
        let fs = LocalFs::new(root.as_ref(), false, false, false);
        Box::new(GuardedFs::new(*fs, !writable))
    }
}

fn denied<'a, T: Send + 'a>(op: &str, path: &DavPath) -> FsFuture<'a, T> {
    trace!("FS: {op} {path:?} refused, read-only");
    future::ready(Err(FsError::Forbidden)).boxed()
}

fn opens_for_writing(options: &OpenOptions) -> bool {
    options.write || options.append || options.truncate || options.create || options.create_new
}

impl<FS> DavFileSystem for GuardedFs<FS>
where
    FS: DavFileSystem + Clone + 'static,
{
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        self.inner.metadata(path)
    }

    fn symlink_metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        self.inner.symlink_metadata(path)
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        meta: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        self.inner.read_dir(path, meta)
    }

    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        if self.read_only && opens_for_writing(&options) {
            return denied("open", path);
        }
        self.inner.open(path, options)
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        if self.read_only {
            return denied("create_dir", path);
        }
        self.inner.create_dir(path)
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        if self.read_only {
            return denied("remove_dir", path);
        }
        self.inner.remove_dir(path)
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        if self.read_only {
            return denied("remove_file", path);
        }
        self.inner.remove_file(path)
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        if self.read_only {
            return denied("rename", from);
        }
        self.inner.rename(from, to)
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        if self.read_only {
            return denied("copy", from);
        }
        self.inner.copy(from, to)
    }
}
