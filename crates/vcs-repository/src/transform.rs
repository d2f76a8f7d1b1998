//! Tracks which multi-step operation (rebase, merge, cherry-pick, revert) is
//! currently in progress, and which actions are valid against it.
//!
//! At most one transformation is active at a time; [`TransformStore::current`]
//! checks the on-disk markers in priority order `rebase > merge > cherry-pick
//! > revert`. A `sequencer` (`sequencer/todo`, `sequencer/done`) is shared
//! infrastructure stepped through by an interactive rebase or a multi-commit
//! cherry-pick/revert; its presence changes what `skip`/`quit` can do.

use std::sync::Arc;

use vcs_hash::ObjectId;
use vcs_utils::FilesApi;

use crate::RepoError;

const MERGE_HEAD: &str = "MERGE_HEAD";
const MERGE_MSG: &str = "MERGE_MSG";
const CHERRY_PICK_HEAD: &str = "CHERRY_PICK_HEAD";
const REVERT_HEAD: &str = "REVERT_HEAD";
const ORIG_HEAD: &str = "ORIG_HEAD";
const REBASE_MERGE_DIR: &str = "rebase-merge";
const REBASE_APPLY_DIR: &str = "rebase-apply";
const REBASE_ONTO: &str = "rebase-merge/onto";
const REBASE_HEAD_NAME: &str = "rebase-merge/head-name";
const REBASE_INTERACTIVE: &str = "rebase-merge/interactive";
const SEQUENCER_TODO: &str = "sequencer/todo";
const SEQUENCER_DONE: &str = "sequencer/done";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationKind {
    Rebase,
    Merge,
    CherryPick,
    Revert,
}

impl TransformationKind {
    fn label(self) -> &'static str {
        match self {
            TransformationKind::Rebase => "rebase",
            TransformationKind::Merge => "merge",
            TransformationKind::CherryPick => "cherry-pick",
            TransformationKind::Revert => "revert",
        }
    }
}

/// Which actions are currently valid against the active transformation, if
/// any. All fields are `false` when nothing is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_continue: bool,
    pub can_skip: bool,
    pub can_abort: bool,
    pub can_quit: bool,
}

#[derive(Debug, Clone)]
pub struct MergeState {
    pub heads: Vec<ObjectId>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RebaseState {
    pub onto: ObjectId,
    pub orig_head: ObjectId,
    pub head_name: String,
    pub interactive: bool,
    pub todo: Vec<String>,
    pub done: Vec<String>,
}

fn read_to_string(files: &dyn FilesApi, path: &str) -> Result<String, RepoError> {
    use std::io::Read;
    let mut s = String::new();
    files.read(path, Default::default())?.read_to_string(&mut s)?;
    Ok(s)
}

fn write_string(files: &dyn FilesApi, path: &str, content: &str) -> Result<(), RepoError> {
    let mut cursor = std::io::Cursor::new(content.as_bytes().to_vec());
    files.write(path, &mut cursor)?;
    Ok(())
}

fn lines_of(content: &str) -> Vec<String> {
    content.lines().map(|l| l.to_string()).collect()
}

/// Marker-file-backed store for the in-progress transformation. Wraps a
/// `.git`-directory [`FilesApi`] handle (not the working tree).
pub struct TransformStore {
    files: Arc<dyn FilesApi>,
}

impl TransformStore {
    pub fn new(files: Arc<dyn FilesApi>) -> Self {
        Self { files }
    }

    pub fn current(&self) -> Option<TransformationKind> {
        if self.files.exists(REBASE_MERGE_DIR) || self.files.exists(REBASE_APPLY_DIR) {
            Some(TransformationKind::Rebase)
        } else if self.files.exists(MERGE_HEAD) {
            Some(TransformationKind::Merge)
        } else if self.files.exists(CHERRY_PICK_HEAD) {
            Some(TransformationKind::CherryPick)
        } else if self.files.exists(REVERT_HEAD) {
            Some(TransformationKind::Revert)
        } else {
            None
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.current().is_some()
    }

    fn require_free(&self) -> Result<(), RepoError> {
        if let Some(active) = self.current() {
            return Err(RepoError::TransformationInProgress(active.label()));
        }
        Ok(())
    }

    pub fn save_orig_head(&self, head: &ObjectId) -> Result<(), RepoError> {
        write_string(self.files.as_ref(), ORIG_HEAD, &head.to_hex())
    }

    pub fn orig_head(&self) -> Option<ObjectId> {
        read_to_string(self.files.as_ref(), ORIG_HEAD).ok().and_then(|s| ObjectId::from_hex(s.trim()).ok())
    }

    fn clear_orig_head(&self) {
        let _ = self.files.remove(ORIG_HEAD);
    }

    // -- merge -----------------------------------------------------------

    pub fn begin_merge(&self, heads: &[ObjectId], message: &str) -> Result<(), RepoError> {
        self.require_free()?;
        let joined = heads.iter().map(|h| h.to_hex()).collect::<Vec<_>>().join("\n");
        write_string(self.files.as_ref(), MERGE_HEAD, &(joined + "\n"))?;
        write_string(self.files.as_ref(), MERGE_MSG, message)?;
        Ok(())
    }

    pub fn is_merge_in_progress(&self) -> bool {
        self.files.exists(MERGE_HEAD)
    }

    pub fn read_merge(&self) -> Result<Option<MergeState>, RepoError> {
        if !self.is_merge_in_progress() {
            return Ok(None);
        }
        let heads = lines_of(&read_to_string(self.files.as_ref(), MERGE_HEAD)?)
            .into_iter()
            .map(|h| ObjectId::from_hex(&h).map_err(|_| RepoError::InvalidHead(h)))
            .collect::<Result<Vec<_>, _>>()?;
        let message = read_to_string(self.files.as_ref(), MERGE_MSG).unwrap_or_default();
        Ok(Some(MergeState { heads, message }))
    }

    pub fn update_merge_message(&self, message: &str) -> Result<(), RepoError> {
        write_string(self.files.as_ref(), MERGE_MSG, message)
    }

    pub fn complete_merge(&self) -> Result<(), RepoError> {
        let _ = self.files.remove(MERGE_HEAD);
        let _ = self.files.remove(MERGE_MSG);
        self.clear_orig_head();
        Ok(())
    }

    pub fn abort_merge(&self) -> Result<(), RepoError> {
        self.complete_merge()
    }

    // -- cherry-pick / revert --------------------------------------------
    //
    // These two share a shape: a single marker naming the commit currently
    // being applied, plus an optional shared sequencer when more than one
    // commit was requested.

    pub fn begin_cherry_pick(&self, head: &ObjectId) -> Result<(), RepoError> {
        self.require_free()?;
        write_string(self.files.as_ref(), CHERRY_PICK_HEAD, &head.to_hex())
    }

    pub fn is_cherry_pick_in_progress(&self) -> bool {
        self.files.exists(CHERRY_PICK_HEAD)
    }

    pub fn read_cherry_pick(&self) -> Result<Option<ObjectId>, RepoError> {
        self.read_single_head(CHERRY_PICK_HEAD)
    }

    pub fn complete_cherry_pick(&self) -> Result<(), RepoError> {
        let _ = self.files.remove(CHERRY_PICK_HEAD);
        self.complete_sequencer();
        self.clear_orig_head();
        Ok(())
    }

    pub fn abort_cherry_pick(&self) -> Result<(), RepoError> {
        self.complete_cherry_pick()
    }

    pub fn begin_revert(&self, head: &ObjectId) -> Result<(), RepoError> {
        self.require_free()?;
        write_string(self.files.as_ref(), REVERT_HEAD, &head.to_hex())
    }

    pub fn is_revert_in_progress(&self) -> bool {
        self.files.exists(REVERT_HEAD)
    }

    pub fn read_revert(&self) -> Result<Option<ObjectId>, RepoError> {
        self.read_single_head(REVERT_HEAD)
    }

    pub fn complete_revert(&self) -> Result<(), RepoError> {
        let _ = self.files.remove(REVERT_HEAD);
        self.complete_sequencer();
        self.clear_orig_head();
        Ok(())
    }

    pub fn abort_revert(&self) -> Result<(), RepoError> {
        self.complete_revert()
    }

    fn read_single_head(&self, marker: &str) -> Result<Option<ObjectId>, RepoError> {
        if !self.files.exists(marker) {
            return Ok(None);
        }
        let content = read_to_string(self.files.as_ref(), marker)?;
        Ok(Some(ObjectId::from_hex(content.trim()).map_err(|_| RepoError::InvalidHead(content))?))
    }

    // -- rebase ------------------------------------------------------------

    pub fn begin_rebase(&self, onto: &ObjectId, orig_head: &ObjectId, head_name: &str, interactive: bool, todo: Vec<String>) -> Result<(), RepoError> {
        self.require_free()?;
        write_string(self.files.as_ref(), REBASE_ONTO, &onto.to_hex())?;
        write_string(self.files.as_ref(), REBASE_HEAD_NAME, head_name)?;
        if interactive {
            write_string(self.files.as_ref(), REBASE_INTERACTIVE, "")?;
        }
        self.save_orig_head(orig_head)?;
        self.begin_sequencer(todo)
    }

    pub fn is_rebase_in_progress(&self) -> bool {
        self.files.exists(REBASE_MERGE_DIR) || self.files.exists(REBASE_APPLY_DIR)
    }

    pub fn read_rebase(&self) -> Result<Option<RebaseState>, RepoError> {
        if !self.is_rebase_in_progress() {
            return Ok(None);
        }
        let onto_hex = read_to_string(self.files.as_ref(), REBASE_ONTO)?;
        let onto = ObjectId::from_hex(onto_hex.trim()).map_err(|_| RepoError::InvalidHead(onto_hex))?;
        let orig_head = self.orig_head().ok_or_else(|| RepoError::InvalidHead(ORIG_HEAD.to_string()))?;
        let head_name = read_to_string(self.files.as_ref(), REBASE_HEAD_NAME).unwrap_or_default().trim().to_string();
        let interactive = self.files.exists(REBASE_INTERACTIVE);
        let (todo, done) = self.read_sequencer_lists();
        Ok(Some(RebaseState { onto, orig_head, head_name, interactive, todo, done }))
    }

    pub fn rebase_next_step(&self) -> Option<String> {
        self.read_sequencer_lists().0.first().cloned()
    }

    pub fn rebase_advance(&self) -> Result<(), RepoError> {
        self.sequencer_advance()
    }

    pub fn rebase_skip(&self) -> Result<(), RepoError> {
        self.sequencer_skip()
    }

    pub fn update_rebase_todo_list(&self, todo: Vec<String>) -> Result<(), RepoError> {
        self.update_sequencer_todo(todo)
    }

    pub fn complete_rebase(&self) -> Result<(), RepoError> {
        let _ = self.files.remove(REBASE_MERGE_DIR);
        let _ = self.files.remove(REBASE_APPLY_DIR);
        self.complete_sequencer();
        self.clear_orig_head();
        Ok(())
    }

    pub fn abort_rebase(&self) -> Result<(), RepoError> {
        self.complete_rebase()
    }

    // -- sequencer -----------------------------------------------------

    pub fn begin_sequencer(&self, todo: Vec<String>) -> Result<(), RepoError> {
        write_string(self.files.as_ref(), SEQUENCER_TODO, &todo.join("\n"))?;
        write_string(self.files.as_ref(), SEQUENCER_DONE, "")?;
        Ok(())
    }

    pub fn is_sequencer_active(&self) -> bool {
        self.files.exists(SEQUENCER_TODO)
    }

    fn read_sequencer_lists(&self) -> (Vec<String>, Vec<String>) {
        let todo = read_to_string(self.files.as_ref(), SEQUENCER_TODO).map(|s| lines_of(&s)).unwrap_or_default();
        let done = read_to_string(self.files.as_ref(), SEQUENCER_DONE).map(|s| lines_of(&s)).unwrap_or_default();
        (todo, done)
    }

    pub fn update_sequencer_todo(&self, todo: Vec<String>) -> Result<(), RepoError> {
        write_string(self.files.as_ref(), SEQUENCER_TODO, &todo.join("\n"))
    }

    /// Move the first pending line from `todo` into `done`, after it has
    /// been applied.
    pub fn sequencer_advance(&self) -> Result<(), RepoError> {
        let (mut todo, mut done) = self.read_sequencer_lists();
        if todo.is_empty() {
            return Ok(());
        }
        let step = todo.remove(0);
        done.push(step);
        write_string(self.files.as_ref(), SEQUENCER_TODO, &todo.join("\n"))?;
        write_string(self.files.as_ref(), SEQUENCER_DONE, &done.join("\n"))
    }

    /// Drop the first pending line from `todo` without recording it done.
    pub fn sequencer_skip(&self) -> Result<(), RepoError> {
        let (mut todo, _) = self.read_sequencer_lists();
        if todo.is_empty() {
            return Ok(());
        }
        todo.remove(0);
        write_string(self.files.as_ref(), SEQUENCER_TODO, &todo.join("\n"))
    }

    fn complete_sequencer(&self) {
        let _ = self.files.remove(SEQUENCER_TODO);
        let _ = self.files.remove(SEQUENCER_DONE);
    }

    // -- generic -----------------------------------------------------------

    /// Which actions the active transformation currently permits. All
    /// `false` if nothing is in progress.
    pub fn capabilities(&self) -> Capabilities {
        match self.current() {
            None => Capabilities::default(),
            Some(TransformationKind::Merge) => Capabilities { can_continue: true, can_skip: false, can_abort: true, can_quit: false },
            Some(TransformationKind::Revert) => {
                let sequencer = self.is_sequencer_active();
                Capabilities { can_continue: true, can_skip: sequencer, can_abort: true, can_quit: sequencer }
            }
            Some(TransformationKind::CherryPick) => {
                let sequencer = self.is_sequencer_active();
                Capabilities { can_continue: true, can_skip: sequencer, can_abort: true, can_quit: sequencer }
            }
            Some(TransformationKind::Rebase) => {
                let interactive = self.files.exists(REBASE_INTERACTIVE);
                Capabilities { can_continue: true, can_skip: true, can_abort: true, can_quit: interactive }
            }
        }
    }

    /// Clean up whichever transformation is active, plus the sequencer if
    /// present. A no-op if nothing is in progress.
    pub fn abort_current(&self) -> Result<(), RepoError> {
        match self.current() {
            None => Err(RepoError::NotInProgress),
            Some(TransformationKind::Merge) => self.abort_merge(),
            Some(TransformationKind::Rebase) => self.abort_rebase(),
            Some(TransformationKind::CherryPick) => self.abort_cherry_pick(),
            Some(TransformationKind::Revert) => self.abort_revert(),
        }
    }
}
