//! Core revision walk iterator.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;
use vcs_ref::{RefName, RefStore};

use crate::{is_commit, read_commit, RevWalkError};

/// Sort order for commit traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// By committer date, newest first (default).
    #[default]
    Chronological,
    /// Topological: parents always appear after children.
    Topological,
}

/// Options for revision walking.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    pub sort: SortOrder,
    pub first_parent_only: bool,
    pub max_count: Option<usize>,
    pub skip: Option<usize>,
}

/// An entry in the date-ordered walk priority queue.
struct WalkEntry {
    oid: ObjectId,
    commit_date: i64,
    insertion_ctr: u64,
}

impl PartialEq for WalkEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
impl Eq for WalkEntry {}

impl PartialOrd for WalkEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WalkEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; newest commit date first, ties broken
        // by earliest insertion.
        self.commit_date.cmp(&other.commit_date).then_with(|| other.insertion_ctr.cmp(&self.insertion_ctr))
    }
}

/// State for topological emission: in-degree counts and a ready queue.
struct TopoState {
    indegree: HashMap<ObjectId, u32>,
    ready: VecDeque<ObjectId>,
    dates: HashMap<ObjectId, i64>,
}

/// Revision walk iterator over commits reachable from pushed starting
/// points, minus anything reachable from hidden ones.
pub struct RevWalk<'a> {
    odb: &'a ObjectDatabase,
    queue: BinaryHeap<WalkEntry>,
    seen: HashSet<ObjectId>,
    hidden: HashSet<ObjectId>,
    options: WalkOptions,
    insertion_ctr: u64,
    emitted: usize,
    skipped: usize,
    topo_state: Option<TopoState>,
    prepared: bool,
}

impl<'a> RevWalk<'a> {
    pub fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            odb,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            hidden: HashSet::new(),
            options: WalkOptions::default(),
            insertion_ctr: 0,
            emitted: 0,
            skipped: 0,
            topo_state: None,
            prepared: false,
        }
    }

    /// Add a starting commit (a positive reference).
    pub fn push(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        if self.seen.contains(&oid) {
            return Ok(());
        }
        let commit = read_commit(self.odb, &oid)?;
        self.seen.insert(oid);
        let entry = WalkEntry { oid, commit_date: commit.committer.date.timestamp, insertion_ctr: self.insertion_ctr };
        self.insertion_ctr += 1;
        self.queue.push(entry);
        Ok(())
    }

    /// Mark a commit and all its ancestors as excluded from output.
    pub fn hide(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        let mut stack = vec![oid];
        while let Some(current) = stack.pop() {
            if !self.hidden.insert(current) {
                continue;
            }
            if let Ok(commit) = read_commit(self.odb, &current) {
                for parent in &commit.parents {
                    if !self.hidden.contains(parent) {
                        stack.push(*parent);
                    }
                }
            }
        }
        Ok(())
    }

    /// Push the ref's resolved target as a starting point.
    pub fn push_ref(&mut self, refs: &dyn RefStore, name: &RefName) -> Result<(), RevWalkError> {
        if let Some(oid) = refs.resolve_to_oid(name)? {
            if is_commit(self.odb, &oid) {
                self.push(oid)?;
            }
        }
        Ok(())
    }

    /// Push every ref under `prefix` (e.g. `refs/heads/`) as a starting point.
    pub fn push_prefix(&mut self, refs: &dyn RefStore, prefix: &str) -> Result<(), RevWalkError> {
        for r in refs.iter(Some(prefix))? {
            let r = r?;
            if let Some(oid) = r.target_oid() {
                if is_commit(self.odb, &oid) {
                    self.push(oid)?;
                }
            } else if let Some(oid) = refs.resolve_to_oid(r.name())? {
                if is_commit(self.odb, &oid) {
                    self.push(oid)?;
                }
            }
        }
        Ok(())
    }

    pub fn set_options(&mut self, options: WalkOptions) {
        self.options = options;
    }

    fn parents_of(&self, oid: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
        let commit = read_commit(self.odb, oid)?;
        Ok(if self.options.first_parent_only {
            commit.parents.first().copied().into_iter().collect()
        } else {
            commit.parents
        })
    }

    fn prepare_topo(&mut self) -> Result<(), RevWalkError> {
        if self.prepared {
            return Ok(());
        }
        self.prepared = true;

        let mut all_commits: Vec<ObjectId> = Vec::new();
        let mut dates: HashMap<ObjectId, i64> = HashMap::new();
        let mut indegree: HashMap<ObjectId, u32> = HashMap::new();

        let mut bfs: VecDeque<ObjectId> = VecDeque::new();
        let mut visited: HashSet<ObjectId> = HashSet::new();
        while let Some(entry) = self.queue.pop() {
            if visited.insert(entry.oid) {
                bfs.push_back(entry.oid);
            }
        }

        while let Some(oid) = bfs.pop_front() {
            if self.hidden.contains(&oid) {
                continue;
            }
            let commit = read_commit(self.odb, &oid)?;
            dates.insert(oid, commit.committer.date.timestamp);
            let parents: Vec<ObjectId> = if self.options.first_parent_only {
                commit.parents.first().copied().into_iter().collect()
            } else {
                commit.parents
            };

            indegree.entry(oid).or_insert(0);
            for parent in &parents {
                if !self.hidden.contains(parent) {
                    *indegree.entry(*parent).or_insert(0) += 1;
                    if visited.insert(*parent) {
                        bfs.push_back(*parent);
                    }
                }
            }
            all_commits.push(oid);
        }

        let mut tips: Vec<ObjectId> =
            all_commits.iter().filter(|oid| indegree.get(oid).copied().unwrap_or(0) == 0).copied().collect();
        tips.sort_by(|a, b| dates.get(b).copied().unwrap_or(0).cmp(&dates.get(a).copied().unwrap_or(0)));

        self.topo_state = Some(TopoState { indegree, ready: tips.into(), dates });
        Ok(())
    }

    fn next_topo(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        if !self.prepared {
            self.prepare_topo()?;
        }
        let oid = match self.topo_state.as_mut() {
            Some(state) if !state.ready.is_empty() => state.ready.pop_front().unwrap(),
            _ => return Ok(None),
        };

        let parents: Vec<ObjectId> = self.parents_of(&oid)?.into_iter().filter(|p| !self.hidden.contains(p)).collect();

        let state = self.topo_state.as_mut().unwrap();
        let mut newly_ready: Vec<(ObjectId, i64)> = Vec::new();
        for parent in &parents {
            if let Some(deg) = state.indegree.get_mut(parent) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    newly_ready.push((*parent, state.dates.get(parent).copied().unwrap_or(0)));
                }
            }
        }
        newly_ready.sort_by(|a, b| b.1.cmp(&a.1));
        for (parent, _) in newly_ready {
            state.ready.push_back(parent);
        }

        Ok(Some(oid))
    }

    fn next_chronological(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        while let Some(entry) = self.queue.pop() {
            let oid = entry.oid;
            if self.hidden.contains(&oid) {
                continue;
            }
            for parent in self.parents_of(&oid)? {
                if self.seen.insert(parent) && !self.hidden.contains(&parent) {
                    if let Ok(parent_commit) = read_commit(self.odb, &parent) {
                        self.queue.push(WalkEntry {
                            oid: parent,
                            commit_date: parent_commit.committer.date.timestamp,
                            insertion_ctr: self.insertion_ctr,
                        });
                        self.insertion_ctr += 1;
                    }
                }
            }
            return Ok(Some(oid));
        }
        Ok(None)
    }

    fn next_raw(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        match self.options.sort {
            SortOrder::Topological => self.next_topo(),
            SortOrder::Chronological => self.next_chronological(),
        }
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(max) = self.options.max_count {
            if self.emitted >= max {
                return None;
            }
        }
        loop {
            let oid = match self.next_raw() {
                Ok(Some(oid)) => oid,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            if let Some(skip) = self.options.skip {
                if self.skipped < skip {
                    self.skipped += 1;
                    continue;
                }
            }

            self.emitted += 1;
            return Some(Ok(oid));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_object::{Commit, Object};
    use vcs_odb::ObjectDatabase;
    use vcs_utils::{GitDate, Signature};

    fn sig(ts: i64) -> Signature {
        Signature { name: "t".into(), email: "t@example.com".into(), date: GitDate { timestamp: ts, tz_offset: 0 } }
    }

    fn commit(tree: ObjectId, parents: Vec<ObjectId>, ts: i64) -> Commit {
        Commit {
            tree,
            parents,
            author: sig(ts),
            committer: sig(ts),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: "msg\n".into(),
        }
    }

    fn open_db() -> (tempfile::TempDir, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn vcs_utils::FilesApi> = Arc::new(vcs_utils::FsFiles::new(dir.path()));
        let db = ObjectDatabase::open(files, "objects").unwrap();
        (dir, db)
    }

    #[test]
    fn linear_history_chronological_order() {
        let (_dir, db) = open_db();
        let tree = db.write_raw(vcs_object::ObjectType::Tree, &[]).unwrap();
        let c1 = db.write(&Object::Commit(commit(tree, vec![], 100))).unwrap();
        let c2 = db.write(&Object::Commit(commit(tree, vec![c1], 200))).unwrap();
        let c3 = db.write(&Object::Commit(commit(tree, vec![c2], 300))).unwrap();

        let mut walk = RevWalk::new(&db);
        walk.push(c3).unwrap();
        let ids: Vec<ObjectId> = walk.map(|r| r.unwrap()).collect();
        assert_eq!(ids, vec![c3, c2, c1]);
    }

    #[test]
    fn hide_excludes_ancestors() {
        let (_dir, db) = open_db();
        let tree = db.write_raw(vcs_object::ObjectType::Tree, &[]).unwrap();
        let c1 = db.write(&Object::Commit(commit(tree, vec![], 100))).unwrap();
        let c2 = db.write(&Object::Commit(commit(tree, vec![c1], 200))).unwrap();

        let mut walk = RevWalk::new(&db);
        walk.push(c2).unwrap();
        walk.hide(c1).unwrap();
        let ids: Vec<ObjectId> = walk.map(|r| r.unwrap()).collect();
        assert_eq!(ids, vec![c2]);
    }

    #[test]
    fn max_count_limits_output() {
        let (_dir, db) = open_db();
        let tree = db.write_raw(vcs_object::ObjectType::Tree, &[]).unwrap();
        let c1 = db.write(&Object::Commit(commit(tree, vec![], 100))).unwrap();
        let c2 = db.write(&Object::Commit(commit(tree, vec![c1], 200))).unwrap();

        let mut walk = RevWalk::new(&db);
        walk.push(c2).unwrap();
        walk.set_options(WalkOptions { max_count: Some(1), ..Default::default() });
        let ids: Vec<ObjectId> = walk.map(|r| r.unwrap()).collect();
        assert_eq!(ids, vec![c2]);
    }

    #[test]
    fn topological_order_parents_after_children() {
        let (_dir, db) = open_db();
        let tree = db.write_raw(vcs_object::ObjectType::Tree, &[]).unwrap();
        let c1 = db.write(&Object::Commit(commit(tree, vec![], 100))).unwrap();
        let c2a = db.write(&Object::Commit(commit(tree, vec![c1], 200))).unwrap();
        let c2b = db.write(&Object::Commit(commit(tree, vec![c1], 210))).unwrap();
        let merge = db.write(&Object::Commit(commit(tree, vec![c2a, c2b], 300))).unwrap();

        let mut walk = RevWalk::new(&db);
        walk.push(merge).unwrap();
        walk.set_options(WalkOptions { sort: SortOrder::Topological, ..Default::default() });
        let ids: Vec<ObjectId> = walk.map(|r| r.unwrap()).collect();

        let pos = |id: ObjectId| ids.iter().position(|x| *x == id).unwrap();
        assert!(pos(merge) < pos(c2a));
        assert!(pos(merge) < pos(c2b));
        assert!(pos(c2a) < pos(c1));
        assert!(pos(c2b) < pos(c1));
    }
}
