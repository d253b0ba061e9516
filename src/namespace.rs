//! Directory-tree metadata over `Store`.
//!
//! `Namespace` is a flat table of parent/name/child triples keyed by
//! directory, not an in-memory tree: every mutation reads and rewrites one
//! parent's entry list under its `dentry` key, and inode records live
//! under a separate `inode` key so a file's type survives independent of
//! its directory listing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object_id::ObjectId;
use crate::store::Store;

const DENTRY_PREFIX: &str = "dentry/";
const INODE_PREFIX: &str = "inode/";

/// What a directory entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
}

/// One child of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub inode: ObjectId,
    pub name: String,
    pub file_type: FileType,
}

#[derive(Default, Serialize, Deserialize)]
struct DirListing {
    entries: Vec<DirEntry>,
}

/// The namespace directory tree for one Deva group.
pub struct Namespace {
    store: std::sync::Arc<dyn Store>,
    root: ObjectId,
}

impl Namespace {
    /// Construct a `Namespace` rooted at the well-known nil id in
    /// `partition_id`, backed by `store`. Callers must `load` an existing
    /// namespace, or `create` the root directory explicitly on first use.
    pub fn new(store: std::sync::Arc<dyn Store>, partition_id: u32) -> Self {
        Self { store, root: ObjectId::nil(partition_id) }
    }

    /// This namespace's root directory id.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Ensure the root directory exists, as an empty listing, if it does
    /// not already. Idempotent; safe to call on every startup.
    pub fn ensure_root(&self) -> Result<()> {
        if self.read_listing(self.root)?.is_none() {
            self.write_listing(self.root, &DirListing::default())?;
        }
        Ok(())
    }

    /// Create `name` under `parent` as `inode` of `file_type`.
    ///
    /// Fails with `AlreadyExists` if `name` is already present in
    /// `parent`'s listing, and with `NotFound` if `parent` has no
    /// listing at all (it must be a directory that already exists).
    pub fn create(&self, parent: ObjectId, name: &str, file_type: FileType, inode: ObjectId) -> Result<()> {
        let mut listing = self
            .read_listing(parent)?
            .ok_or_else(|| Error::not_found(format!("directory {parent}")))?;

        if listing.entries.iter().any(|e| e.name == name) {
            return Err(Error::already_exists(format!("{name} in {parent}")));
        }
        listing.entries.push(DirEntry { inode, name: name.to_owned(), file_type });
        self.write_listing(parent, &listing)?;

        if file_type == FileType::Directory {
            self.write_listing(inode, &DirListing::default())?;
        }
        Ok(())
    }

    /// Remove `name` from `parent`'s listing.
    ///
    /// A directory entry can only be removed empty; removing a file also
    /// drops its inode record (Deva does not separately reference-count
    /// inodes: one name, one inode).
    pub fn remove(&self, parent: ObjectId, name: &str) -> Result<()> {
        let mut listing = self
            .read_listing(parent)?
            .ok_or_else(|| Error::not_found(format!("directory {parent}")))?;

        let position = listing
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| Error::not_found(format!("{name} in {parent}")))?;
        let entry = listing.entries[position].clone();

        if entry.file_type == FileType::Directory {
            let child_listing = self.read_listing(entry.inode)?.unwrap_or_default();
            if !child_listing.entries.is_empty() {
                return Err(Error::failed_precondition(format!("directory {} is not empty", entry.inode)));
            }
            self.store.remove(&Self::dentry_key(entry.inode))?;
        } else {
            self.store.remove(&Self::inode_key(entry.inode))?;
        }

        listing.entries.remove(position);
        self.write_listing(parent, &listing)
    }

    /// List the immediate children of `parent`.
    pub fn list(&self, parent: ObjectId) -> Result<Vec<DirEntry>> {
        Ok(self
            .read_listing(parent)?
            .ok_or_else(|| Error::not_found(format!("directory {parent}")))?
            .entries)
    }

    /// Resolve a `/`-delimited absolute path to its inode id and type.
    /// The empty path and `/` both resolve to the root.
    pub fn lookup(&self, path: &str) -> Result<(ObjectId, FileType)> {
        let mut current = self.root;
        let mut current_type = FileType::Directory;

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if current_type != FileType::Directory {
                return Err(Error::invalid_argument(format!("{component} has no parent directory in path {path}")));
            }
            let listing = self.read_listing(current)?.ok_or_else(|| Error::not_found(format!("directory {current}")))?;
            let entry = listing
                .entries
                .iter()
                .find(|e| e.name == component)
                .ok_or_else(|| Error::not_found(format!("{component} in path {path}")))?;
            current = entry.inode;
            current_type = entry.file_type;
        }
        Ok((current, current_type))
    }

    /// Record `inode`'s type-independent metadata blob, opaque to
    /// `Namespace` itself (file size, chunk placement, etc. live here).
    pub fn put_inode(&self, inode: ObjectId, metadata: &[u8]) -> Result<()> {
        self.store.put(&Self::inode_key(inode), metadata)
    }

    /// Fetch `inode`'s metadata blob, if any has been recorded.
    pub fn get_inode(&self, inode: ObjectId) -> Result<Option<Vec<u8>>> {
        self.store.get(&Self::inode_key(inode))
    }

    fn read_listing(&self, id: ObjectId) -> Result<Option<DirListing>> {
        match self.store.get(&Self::dentry_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_listing(&self, id: ObjectId, listing: &DirListing) -> Result<()> {
        self.store.put(&Self::dentry_key(id), &bincode::serialize(listing)?)
    }

    fn dentry_key(id: ObjectId) -> String {
        format!("{DENTRY_PREFIX}{id}")
    }

    fn inode_key(id: ObjectId) -> String {
        format!("{INODE_PREFIX}{id}")
    }
}
