//! Branch lifecycle: create, delete, rename, checkout and fast-forward
//! detection, layered on top of refs and commit ancestry.

use crate::commit_store::CommitStore;
use crate::error::{DbError, Result};
use crate::hash::Hash;
use crate::refs::{Head, RefStore};
use crate::storage::StorageBackend;

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub name: String,
    pub commit: Hash,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Base to branch from; defaults to HEAD.
    pub from: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub create: bool,
}

/// Validate a branch name: `(segment)(/segment)*`, segment =
/// `[A-Za-z0-9_-]+`, no `..`, no whitespace, no leading/trailing `/`.
pub fn validate_refname(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::InvalidArgument("branch name must not be empty".into()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(DbError::InvalidArgument(format!(
            "branch name must not start/end with '/': {name}"
        )));
    }
    if name.contains("..") {
        return Err(DbError::InvalidArgument(format!(
            "branch name must not contain '..': {name}"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DbError::InvalidArgument(format!(
            "branch name must not contain whitespace: {name}"
        )));
    }
    for segment in name.split('/') {
        if segment.is_empty()
            || !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DbError::InvalidArgument(format!(
                "invalid branch name segment '{segment}' in '{name}'"
            )));
        }
    }
    Ok(())
}

pub struct BranchManager<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> BranchManager<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    fn refs(&self) -> RefStore<'a> {
        RefStore::new(self.storage)
    }

    fn commits(&self) -> CommitStore<'a> {
        CommitStore::new(self.storage)
    }

    pub fn create(&self, name: &str, opts: &CreateOptions) -> Result<Hash> {
        validate_refname(name)?;
        let refs = self.refs();
        if refs.ref_exists(name)? {
            return Err(DbError::AlreadyExists(format!("branch {name}")));
        }
        let base = match &opts.from {
            Some(from) => refs.resolve_ref(from).or_else(|_| Ok::<_, DbError>(from.clone()))?,
            None => refs.resolve_head()?,
        };
        refs.update_ref(name, &base, None)?;
        Ok(base)
    }

    pub fn delete(&self, name: &str, opts: &DeleteOptions) -> Result<()> {
        let refs = self.refs();
        if let Head::Branch(current) = refs.head()? {
            if current == name {
                return Err(DbError::InvalidArgument(format!(
                    "cannot delete the current branch '{name}'"
                )));
            }
        }
        let target = refs.resolve_ref(name)?;
        if !opts.force {
            let head = refs.resolve_head()?;
            let merged = self.commits().is_ancestor(&target, &head)?;
            if !merged {
                return Err(DbError::InvalidArgument(format!(
                    "branch '{name}' is not fully merged into HEAD; use force to delete anyway"
                )));
            }
        }
        refs.delete_ref(name)?;
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        validate_refname(new)?;
        let refs = self.refs();
        let target = refs.resolve_ref(old)?;
        if refs.ref_exists(new)? {
            return Err(DbError::AlreadyExists(format!("branch {new}")));
        }
        refs.update_ref(new, &target, None)?;
        let old_etag = refs.ref_etag(old)?;
        refs.delete_ref(old)?;
        let _ = old_etag;
        if let Head::Branch(current) = refs.head()? {
            if current == old {
                refs.set_head(new)?;
            }
        }
        Ok(())
    }

    pub fn checkout(&self, name: &str, opts: &CheckoutOptions) -> Result<()> {
        let refs = self.refs();
        if !refs.ref_exists(name)? {
            if opts.create {
                self.create(name, &CreateOptions::default())?;
            } else {
                return Err(DbError::NotFound(format!("branch {name}")));
            }
        }
        refs.set_head(name)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<BranchInfo>> {
        let refs = self.refs();
        let current = match refs.head()? {
            Head::Branch(name) => Some(name),
            Head::Detached(_) => None,
        };
        let mut branches = Vec::new();
        for name in refs.list_refs()? {
            let commit = refs.resolve_ref(&name)?;
            branches.push(BranchInfo {
                is_current: current.as_deref() == Some(name.as_str()),
                name,
                commit,
            });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    pub fn current(&self) -> Result<Option<String>> {
        match self.refs().head()? {
            Head::Branch(name) => Ok(Some(name)),
            Head::Detached(_) => Ok(None),
        }
    }

    /// True iff `target` is an ancestor of `source` — the merge can simply
    /// advance the ref.
    pub fn is_fast_forwardable(&self, target: &Hash, source: &Hash) -> Result<bool> {
        self.commits().is_ancestor(target, source)
    }
}
