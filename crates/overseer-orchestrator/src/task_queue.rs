use overseer_core::{Priority, TaskId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

#[derive(Debug, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    sequence: u64,
    task_id: TaskId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence (earlier submission).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tasks whose dependencies are all met, ordered by priority then
/// submission order.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<ReadyEntry>,
}

impl ReadyQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a task ready.
    pub fn push(&mut self, task_id: TaskId, priority: Priority, sequence: u64) {
        self.heap.push(ReadyEntry {
            priority,
            sequence,
            task_id,
        });
    }

    /// The highest-priority, earliest-submitted ready task.
    pub fn pop(&mut self) -> Option<TaskId> {
        self.heap.pop().map(|e| e.task_id)
    }

    /// Number of ready tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is ready.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Dependency bookkeeping: declared predecessors of every known task,
/// a count of unmet predecessors per task, and a reverse index used to
/// release dependents when a predecessor completes.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    declared: HashMap<TaskId, Vec<TaskId>>,
    unmet: HashMap<TaskId, usize>,
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// If adding `task_id` with `deps` would close a cycle, return the
    /// dependency through which the cycle runs.
    pub fn find_cycle(&self, task_id: &TaskId, deps: &[TaskId]) -> Option<TaskId> {
        deps.iter()
            .find(|dep| *dep == task_id || self.reaches(dep, task_id))
            .cloned()
    }

    /// Depth-first search along declared dependencies.
    fn reaches(&self, from: &TaskId, target: &TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.declared.get(current) {
                stack.extend(next.iter());
            }
        }
        false
    }

    /// Record a task. Returns true when every dependency is already in
    /// `completed`.
    pub fn add(&mut self, task_id: &TaskId, deps: &[TaskId], completed: &HashSet<TaskId>) -> bool {
        let mut waiting = 0;
        for dep in deps {
            if !completed.contains(dep) {
                waiting += 1;
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task_id.clone());
            }
        }
        self.declared.insert(task_id.clone(), deps.to_vec());
        if waiting > 0 {
            self.unmet.insert(task_id.clone(), waiting);
        }
        waiting == 0
    }

    /// True when no dependency of `task_id` is still unmet.
    pub fn is_satisfied(&self, task_id: &TaskId) -> bool {
        !self.unmet.contains_key(task_id)
    }

    /// Mark `task_id` completed. Returns the dependents whose last unmet
    /// predecessor this was.
    pub fn complete(&mut self, task_id: &TaskId) -> Vec<TaskId> {
        let mut released = Vec::new();
        for dependent in self.dependents.remove(task_id).unwrap_or_default() {
            if let Some(count) = self.unmet.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    self.unmet.remove(&dependent);
                    released.push(dependent);
                }
            }
        }
        released
    }

    /// Drop a task that reached a terminal status, along with any edge
    /// only it still referenced. Dependents that were waiting on it stay
    /// blocked.
    pub fn forget(&mut self, task_id: &TaskId) {
        self.unmet.remove(task_id);
        self.dependents.remove(task_id);
        for dep in self.declared.remove(task_id).unwrap_or_default() {
            if let Some(waiting) = self.dependents.get_mut(&dep) {
                waiting.retain(|d| d != task_id);
                if waiting.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut q = ReadyQueue::new();
        q.push(id("low"), Priority::Low, 1);
        q.push(id("high-a"), Priority::High, 2);
        q.push(id("critical"), Priority::Critical, 3);
        q.push(id("high-b"), Priority::High, 4);

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, vec![id("critical"), id("high-a"), id("high-b"), id("low")]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_completion_releases_dependents() {
        let mut g = DependencyGraph::new();
        let done = HashSet::new();
        assert!(g.add(&id("a"), &[], &done));
        assert!(g.add(&id("b"), &[], &done));
        assert!(!g.add(&id("c"), &[id("a"), id("b")], &done));
        assert_eq!(g.unmet.len(), 1);

        assert!(g.complete(&id("a")).is_empty());
        assert!(!g.is_satisfied(&id("c")));
        assert_eq!(g.complete(&id("b")), vec![id("c")]);
        assert!(g.is_satisfied(&id("c")));
    }

    #[test]
    fn test_already_completed_dependency() {
        let mut g = DependencyGraph::new();
        let done: HashSet<_> = [id("a")].into();
        assert!(g.add(&id("b"), &[id("a")], &done));
    }

    #[test]
    fn test_unknown_dependency_blocks() {
        let mut g = DependencyGraph::new();
        assert!(!g.add(&id("b"), &[id("ghost")], &HashSet::new()));
        assert!(!g.is_satisfied(&id("b")));
    }

    #[test]
    fn test_cycle_detection() {
        let mut g = DependencyGraph::new();
        let done = HashSet::new();
        assert_eq!(g.find_cycle(&id("a"), &[id("a")]), Some(id("a")));

        // b waits on a not yet submitted; submitting a -> b closes the loop.
        g.add(&id("b"), &[id("a")], &done);
        g.add(&id("c"), &[id("b")], &done);
        assert_eq!(g.find_cycle(&id("a"), &[id("c")]), Some(id("c")));
        assert_eq!(g.find_cycle(&id("a"), &[id("x")]), None);
        assert_eq!(g.find_cycle(&id("d"), &[id("c"), id("b")]), None);
    }

    #[test]
    fn test_forget_prunes_terminal_tasks() {
        let mut g = DependencyGraph::new();
        let done = HashSet::new();
        g.add(&id("a"), &[], &done);
        g.add(&id("b"), &[id("a"), id("ghost")], &done);
        g.add(&id("c"), &[id("b")], &done);

        // a completes; b still waits on ghost.
        assert!(g.complete(&id("a")).is_empty());
        g.forget(&id("a"));
        assert!(!g.declared.contains_key(&id("a")));

        // b is cancelled: its own edges and the ghost index entry go away,
        // c stays blocked on it.
        g.forget(&id("b"));
        assert!(!g.declared.contains_key(&id("b")));
        assert!(!g.dependents.contains_key(&id("ghost")));
        assert!(!g.dependents.contains_key(&id("b")));
        assert!(!g.is_satisfied(&id("c")));

        g.forget(&id("c"));
        assert!(g.declared.is_empty());
        assert!(g.unmet.is_empty());
        assert!(g.dependents.is_empty());
    }
}
