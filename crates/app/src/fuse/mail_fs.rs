//! Implements the fuser::Filesystem trait over a [`Dispatcher`].

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::prelude::{Attributes, Dispatcher, FsError, NodeKind};
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tokio::runtime::Handle;

use crate::fuse::inode_table::InodeTable;

/// Map a dispatcher failure onto an errno.
///
/// Corruption has no errno of its own and reads as a missing entry; it is
/// reported distinctly by `mailfs check`.
pub fn errno(err: &FsError) -> libc::c_int {
    match err {
        FsError::NotFound(_) | FsError::Corrupt(_) => libc::ENOENT,
        FsError::AlreadyExists(_) => libc::EEXIST,
        FsError::NotEmpty(_) => libc::ENOTEMPTY,
        FsError::IsDirectory(_) => libc::EISDIR,
        FsError::NotDirectory(_) => libc::ENOTDIR,
        FsError::NotSupported(_) => libc::ENOTSUP,
        FsError::TooLarge(_) => libc::EFBIG,
        FsError::Storage(_) => libc::EIO,
    }
}

/// FUSE filesystem backed by a mailfs dispatcher
pub struct MailFs {
    /// Tokio runtime handle for async operations
    rt: Handle,
    fs: Arc<Dispatcher>,
    inodes: InodeTable,
}

impl MailFs {
    /// Default TTL for FUSE attributes
    const ATTR_TTL: Duration = Duration::from_secs(1);

    /// Block size for FUSE
    const BLOCK_SIZE: u32 = 512;

    pub fn new(rt: Handle, fs: Arc<Dispatcher>) -> Self {
        Self {
            rt,
            fs,
            inodes: InodeTable::new(),
        }
    }

    fn make_attr(inode: u64, attrs: &Attributes) -> FileAttr {
        let kind = match attrs.kind {
            NodeKind::Directory => FileType::Directory,
            NodeKind::File => FileType::RegularFile,
        };
        let mtime = attrs.mtime.unwrap_or(UNIX_EPOCH);

        FileAttr {
            ino: inode,
            size: attrs.size,
            blocks: attrs.size.div_ceil(Self::BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: Self::BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, libc::c_int> {
        self.inodes
            .get_path(ino)
            .map(str::to_string)
            .ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, libc::c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        let parent = self.path_of(parent)?;
        Ok(InodeTable::child_path(&parent, name))
    }

    /// Look up attributes for `path` and give it an inode.
    fn entry(&mut self, path: &str) -> Result<FileAttr, libc::c_int> {
        let attrs = self
            .rt
            .block_on(self.fs.attributes(path))
            .map_err(|e| log_errno("attributes", path, &e))?;
        let ino = self.inodes.get_or_create(path);
        Ok(Self::make_attr(ino, &attrs))
    }

    fn setattr_inner(
        &mut self,
        ino: u64,
        size: Option<u64>,
        mtime: Option<TimeOrNow>,
    ) -> Result<FileAttr, libc::c_int> {
        let path = self.path_of(ino)?;

        if let Some(size) = size {
            self.rt
                .block_on(self.fs.resize(&path, size))
                .map_err(|e| log_errno("resize", &path, &e))?;
        }

        if let Some(mtime) = mtime {
            let mtime = match mtime {
                TimeOrNow::SpecificTime(t) => t,
                TimeOrNow::Now => SystemTime::now(),
            };
            self.rt
                .block_on(self.fs.set_times(&path, mtime))
                .map_err(|e| log_errno("set_times", &path, &e))?;
        }

        self.entry(&path)
    }

    fn readdir_inner(
        &mut self,
        ino: u64,
        offset: i64,
        reply: &mut ReplyDirectory,
    ) -> Result<(), libc::c_int> {
        let path = self.path_of(ino)?;
        if self.entry(&path)?.kind != FileType::Directory {
            return Err(libc::ENOTDIR);
        }
        let names = self
            .rt
            .block_on(self.fs.list(&path))
            .map_err(|e| log_errno("list", &path, &e))?;

        for (i, name) in names.iter().enumerate().skip(offset as usize) {
            let (entry_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => {
                    let parent = common::session::path_parent(&path).to_string();
                    (self.inodes.get_or_create(&parent), FileType::Directory)
                }
                _ => {
                    let child = InodeTable::child_path(&path, name);
                    match self.entry(&child) {
                        Ok(attr) => (attr.ino, attr.kind),
                        Err(_) => continue,
                    }
                }
            };

            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        Ok(())
    }

    fn create_inner(&mut self, parent: u64, name: &OsStr, dir: bool) -> Result<FileAttr, libc::c_int> {
        let path = self.child_of(parent, name)?;
        let result = if dir {
            self.rt.block_on(self.fs.create_directory(&path))
        } else {
            self.rt.block_on(self.fs.create_file(&path))
        };
        result.map_err(|e| log_errno("create", &path, &e))?;
        self.entry(&path)
    }

    fn remove_inner(&mut self, parent: u64, name: &OsStr, dir: bool) -> Result<(), libc::c_int> {
        let path = self.child_of(parent, name)?;
        let result = if dir {
            self.rt.block_on(self.fs.remove_directory(&path))
        } else {
            self.rt.block_on(self.fs.remove(&path))
        };
        result.map_err(|e| log_errno("remove", &path, &e))?;
        self.inodes.remove_path(&path);
        Ok(())
    }

    fn rename_inner(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> Result<(), libc::c_int> {
        let from = self.child_of(parent, name)?;
        let to = self.child_of(newparent, newname)?;
        self.rt
            .block_on(self.fs.rename(&from, &to))
            .map_err(|e| log_errno("rename", &from, &e))?;
        self.inodes.rename(&from, &to);
        Ok(())
    }
}

fn log_errno(op: &str, path: &str, err: &FsError) -> libc::c_int {
    match err {
        FsError::NotFound(_) => tracing::trace!(op, path, "not found"),
        FsError::Storage(_) | FsError::Corrupt(_) => {
            tracing::error!(op, path, error = %err, "filesystem call failed")
        }
        _ => tracing::debug!(op, path, error = %err, "filesystem call refused"),
    }
    errno(err)
}

impl Filesystem for MailFs {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        tracing::info!("FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(e) = self.rt.block_on(self.fs.shutdown()) {
            tracing::error!("failed to drain session on unmount: {}", e);
        }
        tracing::info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child_of(parent, name).and_then(|path| self.entry(&path)) {
            Ok(attr) => reply.entry(&Self::ATTR_TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.path_of(ino).and_then(|path| self.entry(&path)) {
            Ok(attr) => reply.attr(&Self::ATTR_TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.setattr_inner(ino, size, mtime) {
            Ok(attr) => reply.attr(&Self::ATTR_TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.readdir_inner(ino, offset, &mut reply) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.path_of(ino).and_then(|path| self.entry(&path)) {
            Ok(attr) if attr.kind == FileType::Directory => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self.path_of(ino).and_then(|path| {
            self.rt
                .block_on(self.fs.read_at(&path, size as usize, offset.max(0) as u64))
                .map_err(|e| log_errno("read", &path, &e))
        });
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self.path_of(ino).and_then(|path| {
            self.rt
                .block_on(self.fs.write_at(&path, data, offset.max(0) as u64))
                .map_err(|e| log_errno("write", &path, &e))
        });
        match result {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self.path_of(ino).and_then(|path| {
            self.rt
                .block_on(self.fs.flush(&path))
                .map_err(|e| log_errno("flush", &path, &e))
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self.path_of(ino).and_then(|path| {
            self.rt
                .block_on(self.fs.release(&path))
                .map_err(|e| log_errno("release", &path, &e))
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_inner(parent, name, false) {
            Ok(attr) => reply.created(&Self::ATTR_TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        // Regular files only; no devices, fifos or sockets
        if mode & libc::S_IFMT as u32 != libc::S_IFREG as u32 {
            reply.error(libc::ENOTSUP);
            return;
        }
        match self.create_inner(parent, name, false) {
            Ok(attr) => reply.entry(&Self::ATTR_TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        match self.create_inner(parent, name, true) {
            Ok(attr) => reply.entry(&Self::ATTR_TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.remove_inner(parent, name, false) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.remove_inner(parent, name, true) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.rename_inner(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }
}
