//! Worker tree topology and idle-subtree bookkeeping (§3, §4.6, §4.7).
//!
//! The tree is a pure index structure — parent/child worker IDs, no pointer
//! cycles — built fresh for each worker from its ID and the partition's
//! runtime worker count, per the "keep it a numeric index structure" design
//! note.

/// One worker's view of the complete binary tree over `num_workers_rt`
/// workers (worker 0 is root; children of `i` are `2i+1`, `2i+2`).
#[derive(Debug, Clone, Copy)]
pub struct WorkerTree {
    pub id: usize,
    pub parent: Option<usize>,
    pub left_child: Option<usize>,
    pub right_child: Option<usize>,
    /// Set only by this worker, on receiving a `Failed` request from its
    /// left child. Single-writer (this worker), per §5.
    pub left_subtree_is_idle: bool,
    /// Same, for the right child.
    pub right_subtree_is_idle: bool,
    /// True once this worker has dropped `MaxSteal - 1` requests and
    /// forwarded the last as `Failed` to its parent (§4.7).
    pub waiting_for_tasks: bool,
}

impl WorkerTree {
    /// Build the tree node for worker `id` in a partition of `num_workers_rt`
    /// workers.
    pub fn init(id: usize, num_workers_rt: usize) -> WorkerTree {
        debug_assert!(id < num_workers_rt);
        let parent = if id == 0 { None } else { Some((id - 1) / 2) };
        let left = 2 * id + 1;
        let right = 2 * id + 2;
        WorkerTree {
            id,
            parent,
            left_child: (left < num_workers_rt).then_some(left),
            right_child: (right < num_workers_rt).then_some(right),
            left_subtree_is_idle: false,
            right_subtree_is_idle: false,
            waiting_for_tasks: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Record a `Failed` request arriving from `child`. Panics if `child` is
    /// not actually this worker's left or right child, or if the
    /// corresponding flag was already set — both are protocol invariant
    /// violations (§7).
    pub fn mark_child_idle(&mut self, child: usize) {
        if Some(child) == self.left_child {
            assert!(!self.left_subtree_is_idle, "left subtree already idle");
            self.left_subtree_is_idle = true;
        } else if Some(child) == self.right_child {
            assert!(!self.right_subtree_is_idle, "right subtree already idle");
            self.right_subtree_is_idle = true;
        } else {
            panic!("Failed request from {child} is not a child of worker {}", self.id);
        }
    }

    /// Clear both subtree-idle flags, e.g. after sending tasks downward via
    /// the lifeline queue.
    pub fn clear_idle_flags(&mut self) {
        self.left_subtree_is_idle = false;
        self.right_subtree_is_idle = false;
    }

    /// True when both children report idle (vacuously true for an absent
    /// child).
    pub fn both_subtrees_idle(&self) -> bool {
        let left_ok = self.left_child.is_none() || self.left_subtree_is_idle;
        let right_ok = self.right_child.is_none() || self.right_subtree_is_idle;
        left_ok && right_ok
    }

    /// Local quiescence (§4.7 / §8 invariant region): both subtrees idle,
    /// own deque empty, and this worker itself has stopped issuing new
    /// steal requests.
    pub fn is_locally_quiescent(&self, own_deque_empty: bool) -> bool {
        self.both_subtrees_idle() && own_deque_empty && self.waiting_for_tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        let t = WorkerTree::init(0, 4);
        assert!(t.is_root());
        assert_eq!(t.left_child, Some(1));
        assert_eq!(t.right_child, Some(2));
    }

    #[test]
    fn leaf_has_no_children() {
        let t = WorkerTree::init(3, 4);
        assert_eq!(t.left_child, None);
        assert_eq!(t.right_child, None);
        assert_eq!(t.parent, Some(1));
    }

    #[test]
    fn single_worker_partition_is_root_and_leaf() {
        let t = WorkerTree::init(0, 1);
        assert!(t.is_root());
        assert_eq!(t.left_child, None);
        assert_eq!(t.right_child, None);
        assert!(t.both_subtrees_idle());
    }

    #[test]
    fn mark_child_idle_sets_only_the_matching_flag() {
        let mut t = WorkerTree::init(0, 4);
        t.mark_child_idle(1);
        assert!(t.left_subtree_is_idle);
        assert!(!t.right_subtree_is_idle);
        assert!(!t.both_subtrees_idle());
        t.mark_child_idle(2);
        assert!(t.both_subtrees_idle());
    }

    #[test]
    #[should_panic(expected = "already idle")]
    fn marking_same_child_idle_twice_panics() {
        let mut t = WorkerTree::init(0, 4);
        t.mark_child_idle(1);
        t.mark_child_idle(1);
    }

    #[test]
    #[should_panic(expected = "is not a child")]
    fn marking_a_non_child_idle_panics() {
        let mut t = WorkerTree::init(0, 4);
        t.mark_child_idle(3);
    }

    #[test]
    fn locally_quiescent_requires_all_three_conditions() {
        let mut t = WorkerTree::init(1, 4);
        assert!(!t.is_locally_quiescent(true));
        t.waiting_for_tasks = true;
        assert!(t.is_locally_quiescent(true));
        assert!(!t.is_locally_quiescent(false));
    }
}
