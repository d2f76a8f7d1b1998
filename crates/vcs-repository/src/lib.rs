//! Repository discovery, initialization, and the working-copy value that
//! every command operates against.

mod checkout;
mod discover;
mod env;
mod error;
mod history;
mod init;
mod link;
mod status;
mod transform;
mod worktree;

pub use checkout::Checkout;
pub use discover::{discover_git_dir, discover_git_dir_with_env, open_git_dir};
pub use env::EnvOverrides;
pub use error::RepoError;
pub use history::History;
pub use status::{
    calculate_status, flatten_tree, IndexStatus, StatusEntry, StatusOptions, StatusReport, StatusSummary, WorkTreeStatus,
};
pub use transform::{
    Capabilities, MergeState, RebaseState, TransformStore, TransformationKind,
};
pub use worktree::{Worktree, WorktreeEntry};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vcs_utils::{FilesApi, FsFiles};

/// Type of repository, determined at discovery or init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    /// Has a working tree alongside its git directory.
    Normal,
    /// No working tree.
    Bare,
    /// A linked worktree sharing objects/refs with a main repository.
    LinkedWorktree,
}

/// Result of locating a git directory, before it is opened.
#[derive(Debug, Clone)]
pub struct DiscoveredRepo {
    pub git_dir: PathBuf,
    pub work_tree: Option<PathBuf>,
    /// Same as `git_dir` except for a linked worktree, where it names the
    /// shared main repository's git directory (objects and refs live there).
    pub common_dir: PathBuf,
    pub kind: RepositoryKind,
}

/// Options for [`WorkingCopy::init_with`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub bare: bool,
    pub default_branch: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self { bare: false, default_branch: None }
    }
}

/// The value every command is handed to operate against: a bundle of
/// independent subsystems rather than a single owning facade.
///
/// - [`History`] is the object database and ref store — always present.
/// - [`Checkout`] is the staging index — always present, even for a bare
///   repository (a bare repo can still stage a tree with plumbing).
/// - [`Worktree`] is the checked-out filesystem view — `None` for a bare
///   repository.
///
/// Commands borrow a `WorkingCopy`; none of them own its lifecycle.
pub struct WorkingCopy {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    common_dir: PathBuf,
    kind: RepositoryKind,
    history: History,
    checkout: Checkout,
    worktree: Option<Worktree>,
    transform: TransformStore,
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("git_dir", &self.git_dir)
            .field("work_tree", &self.work_tree)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl WorkingCopy {
    /// Open an existing repository at `path`, which may point to either a
    /// git directory or a working tree root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let discovered = if path.join("HEAD").is_file() && path.join("objects").is_dir() {
            discover::open_git_dir(path)?
        } else {
            discover::discover_git_dir(path)?
        };
        Self::from_discovered(discovered)
    }

    /// Discover a repository starting from `start`, walking up through
    /// parent directories.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::from_discovered(discover::discover_git_dir(start.as_ref())?)
    }

    /// Initialize a new repository with a working tree at `path`.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::init_with(path, &InitOptions::default())
    }

    /// Initialize a new bare repository at `path`.
    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::init_with(path, &InitOptions { bare: true, ..Default::default() })
    }

    /// Initialize a new repository at `path` with explicit options.
    pub fn init_with(path: impl AsRef<Path>, options: &InitOptions) -> Result<Self, RepoError> {
        let discovered = init::init_repository(path.as_ref(), options)?;
        Self::from_discovered(discovered)
    }

    fn from_discovered(discovered: DiscoveredRepo) -> Result<Self, RepoError> {
        let DiscoveredRepo { git_dir, work_tree, common_dir, kind } = discovered;

        let common_files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(&common_dir));
        let git_dir_files: Arc<dyn FilesApi> = if common_dir == git_dir { common_files.clone() } else { Arc::new(FsFiles::new(&git_dir)) };

        let history = History::open(common_files.clone())?;
        let checkout = Checkout::new(git_dir_files.clone(), "index");
        let worktree = work_tree.as_ref().map(|wt| Worktree::new(Arc::new(FsFiles::new(wt)) as Arc<dyn FilesApi>));
        let transform = TransformStore::new(git_dir_files);

        Ok(Self { git_dir, work_tree, common_dir, kind, history, checkout, worktree, transform })
    }

    // -- path accessors -----------------------------------------------

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    pub fn is_bare(&self) -> bool {
        self.kind == RepositoryKind::Bare
    }

    // -- subsystem accessors --------------------------------------------

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    pub fn checkout_mut(&mut self) -> &mut Checkout {
        &mut self.checkout
    }

    pub fn worktree(&self) -> Option<&Worktree> {
        self.worktree.as_ref()
    }

    pub fn require_worktree(&self) -> Result<&Worktree, RepoError> {
        self.worktree.as_ref().ok_or(RepoError::BareNoWorkTree)
    }

    pub fn transform(&self) -> &TransformStore {
        &self.transform
    }

    /// Snapshot the current index into a tree object. A convenience over
    /// `checkout_mut().write_tree_to(history().odb())` that callers outside
    /// this crate cannot express directly, since `history` and `checkout`
    /// borrow through opaque accessor methods rather than disjoint fields.
    pub fn write_index_tree(&mut self) -> Result<vcs_hash::ObjectId, RepoError> {
        self.checkout.write_tree_to(self.history.odb())
    }

    /// Replace the index wholesale with the contents of `tree_id`.
    pub fn read_index_tree(&mut self, tree_id: &vcs_hash::ObjectId) -> Result<(), RepoError> {
        self.checkout.read_tree_from(self.history.odb(), tree_id)
    }

    /// Status of the working copy: the union of HEAD's tree, the staging
    /// index, and (for a non-bare repository) the working tree.
    pub fn status(&mut self, options: &status::StatusOptions) -> Result<status::StatusReport, RepoError> {
        let worktree = self.worktree.as_ref();
        status::calculate_status(&self.history, &mut self.checkout, worktree, options)
    }
}
