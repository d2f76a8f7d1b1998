//! Merge-base computation via the paint algorithm.
//!
//! Commits reachable from each of the two inputs are marked with a color
//! per input; a commit painted with both colors is a common ancestor. The
//! merge bases are the common ancestors that are not themselves ancestors
//! of another common ancestor.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;

use crate::{read_commit, RevWalkError};

const PARENT1: u8 = 1;
const PARENT2: u8 = 2;
const STALE: u8 = 4;

struct PaintEntry {
    oid: ObjectId,
    date: i64,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
impl Eq for PaintEntry {}

impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.date.cmp(&other.date)
    }
}

/// Find all merge bases of two commits (the lowest common ancestors).
pub fn merge_base(odb: &ObjectDatabase, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
    if a == b {
        return Ok(vec![*a]);
    }
    let results = paint_down_to_common(odb, a, b)?;
    remove_redundant(odb, results)
}

/// Find a single merge base, if one exists.
pub fn merge_base_one(odb: &ObjectDatabase, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>, RevWalkError> {
    Ok(merge_base(odb, a, b)?.into_iter().next())
}

/// Whether `ancestor` is reachable from `descendant` by following parent links.
pub fn is_ancestor(odb: &ObjectDatabase, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool, RevWalkError> {
    if ancestor == descendant {
        return Ok(true);
    }
    is_ancestor_direct(odb, ancestor, descendant)
}

fn paint_down_to_common(odb: &ObjectDatabase, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut flags: HashMap<ObjectId, u8> = HashMap::new();
    let mut queue: BinaryHeap<PaintEntry> = BinaryHeap::new();
    let mut results: Vec<ObjectId> = Vec::new();

    let commit_a = read_commit(odb, a)?;
    let commit_b = read_commit(odb, b)?;
    flags.insert(*a, PARENT1);
    flags.insert(*b, PARENT2);
    queue.push(PaintEntry { oid: *a, date: commit_a.committer.date.timestamp });
    queue.push(PaintEntry { oid: *b, date: commit_b.committer.date.timestamp });

    while let Some(entry) = queue.pop() {
        let current_flags = *flags.get(&entry.oid).unwrap_or(&0);
        if current_flags & STALE != 0 {
            continue;
        }

        if current_flags & (PARENT1 | PARENT2) == (PARENT1 | PARENT2) {
            flags.insert(entry.oid, current_flags | STALE);
            results.push(entry.oid);
            if !queue_has_nonstale(&queue, &flags) {
                break;
            }
            continue;
        }

        let commit = read_commit(odb, &entry.oid)?;
        for parent in &commit.parents {
            let parent_flags = flags.entry(*parent).or_insert(0);
            let new_flags = *parent_flags | current_flags;
            if new_flags != *parent_flags {
                *parent_flags = new_flags;
                if let Ok(parent_commit) = read_commit(odb, parent) {
                    queue.push(PaintEntry { oid: *parent, date: parent_commit.committer.date.timestamp });
                }
            }
        }
    }

    Ok(results)
}

fn queue_has_nonstale(queue: &BinaryHeap<PaintEntry>, flags: &HashMap<ObjectId, u8>) -> bool {
    queue.iter().any(|entry| flags.get(&entry.oid).copied().unwrap_or(0) & STALE == 0)
}

/// Drop bases that are themselves ancestors of another base in the set.
fn remove_redundant(odb: &ObjectDatabase, bases: Vec<ObjectId>) -> Result<Vec<ObjectId>, RevWalkError> {
    if bases.len() <= 1 {
        return Ok(bases);
    }

    let mut to_remove: HashSet<usize> = HashSet::new();
    for i in 0..bases.len() {
        if to_remove.contains(&i) {
            continue;
        }
        for j in (i + 1)..bases.len() {
            if to_remove.contains(&j) {
                continue;
            }
            if is_ancestor_direct(odb, &bases[i], &bases[j])? {
                to_remove.insert(i);
                break;
            } else if is_ancestor_direct(odb, &bases[j], &bases[i])? {
                to_remove.insert(j);
            }
        }
    }

    Ok(bases.into_iter().enumerate().filter(|(idx, _)| !to_remove.contains(idx)).map(|(_, oid)| oid).collect())
}

fn is_ancestor_direct(odb: &ObjectDatabase, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool, RevWalkError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(*descendant);
    visited.insert(*descendant);

    while let Some(current) = queue.pop_front() {
        if current == *ancestor {
            return Ok(true);
        }
        if let Ok(commit) = read_commit(odb, &current) {
            for parent in &commit.parents {
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
    }
    Ok(false)
}
