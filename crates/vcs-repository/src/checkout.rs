use std::sync::Arc;

use vcs_hash::ObjectId;
use vcs_index::Index;
use vcs_odb::ObjectDatabase;
use vcs_utils::FilesApi;

use crate::RepoError;

/// The staging index a working copy stages changes through. Corresponds to
/// the `checkout` field of a [`crate::WorkingCopy`].
///
/// The index is loaded lazily on first access and held in memory until
/// [`Checkout::save`] is called; callers that want every mutation durable
/// immediately should call `save` after each edit.
pub struct Checkout {
    git_dir_files: Arc<dyn FilesApi>,
    index_path: String,
    index: Option<Index>,
}

impl Checkout {
    pub fn new(git_dir_files: Arc<dyn FilesApi>, index_path: impl Into<String>) -> Self {
        Self { git_dir_files, index_path: index_path.into(), index: None }
    }

    pub fn index(&mut self) -> Result<&Index, RepoError> {
        self.load()?;
        Ok(self.index.as_ref().expect("just loaded"))
    }

    pub fn index_mut(&mut self) -> Result<&mut Index, RepoError> {
        self.load()?;
        Ok(self.index.as_mut().expect("just loaded"))
    }

    pub fn save(&mut self) -> Result<(), RepoError> {
        if let Some(index) = self.index.as_mut() {
            index.write(self.git_dir_files.as_ref(), &self.index_path)?;
        }
        Ok(())
    }

    /// Reload from disk, discarding any in-memory edits.
    pub fn reload(&mut self) -> Result<(), RepoError> {
        self.index = None;
        self.load()?;
        Ok(())
    }

    pub fn write_tree_to(&mut self, odb: &ObjectDatabase) -> Result<ObjectId, RepoError> {
        self.load()?;
        Ok(self.index.as_ref().expect("just loaded").write_tree(odb)?)
    }

    pub fn read_tree_from(&mut self, odb: &ObjectDatabase, id: &ObjectId) -> Result<(), RepoError> {
        self.load()?;
        self.index.as_mut().expect("just loaded").read_tree(odb, id)?;
        Ok(())
    }

    fn load(&mut self) -> Result<(), RepoError> {
        if self.index.is_some() {
            return Ok(());
        }
        let index = if self.git_dir_files.exists(&self.index_path) {
            Index::read(self.git_dir_files.as_ref(), &self.index_path)?
        } else {
            Index::new()
        };
        self.index = Some(index);
        Ok(())
    }
}
