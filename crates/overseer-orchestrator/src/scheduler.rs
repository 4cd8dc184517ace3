use crate::task_queue::{DependencyGraph, ReadyQueue};
use crate::types::{TaskCounts, TaskRecord, TaskSubmission};
use chrono::{DateTime, Utc};
use overseer_agent::{TaskRequest, TaskResult};
use overseer_core::{OverseerError, OverseerResult, TaskId, TaskStatus};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

/// Error recorded for tasks that were running when the process stopped.
pub const INTERRUPTED_ERROR: &str = "interrupted by restart";
/// Rejection reason for pending approvals that outlived the timeout.
pub const APPROVAL_TIMEOUT_REASON: &str = "approval timed out";

/// Synchronous task bookkeeping owned by the dispatcher.
///
/// Live tasks stay in `tasks` until they reach a terminal status, then
/// move to the bounded `history`. Ids are unique for the lifetime of the
/// scheduler, including ids restored from a previous run.
#[derive(Debug)]
pub struct Scheduler {
    tasks: HashMap<TaskId, TaskRecord>,
    queue: ReadyQueue,
    graph: DependencyGraph,
    pending: Vec<TaskId>,
    active: HashSet<TaskId>,
    history: VecDeque<TaskRecord>,
    history_limit: usize,
    completed_ids: HashSet<TaskId>,
    seen: HashSet<TaskId>,
    next_sequence: u64,
}

impl Scheduler {
    /// An empty scheduler keeping at most `history_limit` terminal tasks.
    pub fn new(history_limit: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            queue: ReadyQueue::new(),
            graph: DependencyGraph::new(),
            pending: Vec::new(),
            active: HashSet::new(),
            history: VecDeque::new(),
            history_limit,
            completed_ids: HashSet::new(),
            seen: HashSet::new(),
            next_sequence: 0,
        }
    }

    /// Register a submission. With `needs_approval` the task waits in the
    /// pending list; otherwise it is queued, or blocked on dependencies.
    pub fn submit(
        &mut self,
        submission: TaskSubmission,
        needs_approval: bool,
    ) -> OverseerResult<TaskId> {
        let task_id = match submission.id {
            Some(id) => id,
            None => self.fresh_id(),
        };
        if self.seen.contains(&task_id) {
            return Err(OverseerError::DuplicateTask(task_id));
        }

        let mut dependencies = Vec::with_capacity(submission.dependencies.len());
        for dep in submission.dependencies {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }
        if let Some(via) = self.graph.find_cycle(&task_id, &dependencies) {
            return Err(OverseerError::DependencyCycle { task_id, via });
        }

        let mut request = TaskRequest::new(task_id.clone(), submission.params);
        request.name = submission.name;

        let record = TaskRecord {
            task_id: task_id.clone(),
            agent_name: submission.agent_name,
            task: request,
            priority: submission.priority,
            dependencies,
            requires_approval: needs_approval,
            status: if needs_approval {
                TaskStatus::WaitingApproval
            } else {
                TaskStatus::Queued
            },
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            sequence: self.bump_sequence(),
        };
        self.admit(record);
        Ok(task_id)
    }

    fn admit(&mut self, record: TaskRecord) {
        let task_id = record.task_id.clone();
        self.seen.insert(task_id.clone());
        let ready = self
            .graph
            .add(&task_id, &record.dependencies, &self.completed_ids);

        if record.status == TaskStatus::WaitingApproval {
            self.pending.push(task_id.clone());
        } else if ready {
            self.queue.push(task_id.clone(), record.priority, record.sequence);
        }
        self.tasks.insert(task_id, record);
    }

    fn fresh_id(&self) -> TaskId {
        loop {
            let id = TaskId::generate();
            if !self.seen.contains(&id) {
                return id;
            }
        }
    }

    fn bump_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Move a pending task into scheduling. False when it is not pending.
    pub fn approve(&mut self, task_id: &TaskId) -> bool {
        let Some(pos) = self.pending.iter().position(|id| id == task_id) else {
            return false;
        };
        self.pending.remove(pos);

        let Some(record) = self.tasks.get_mut(task_id) else {
            return false;
        };
        record.status = TaskStatus::Approved;
        if self.graph.is_satisfied(task_id) {
            self.queue
                .push(task_id.clone(), record.priority, record.sequence);
        }
        true
    }

    /// Cancel a pending task. False when it is not pending.
    pub fn reject(&mut self, task_id: &TaskId, reason: &str) -> bool {
        let Some(pos) = self.pending.iter().position(|id| id == task_id) else {
            return false;
        };
        self.pending.remove(pos);
        self.finish(task_id, TaskStatus::Cancelled, None, Some(reason.to_string()));
        true
    }

    /// Cancel pending approvals submitted more than `timeout` before `now`.
    pub fn expire_approvals(&mut self, timeout: Duration, now: DateTime<Utc>) -> Vec<TaskId> {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let expired: Vec<TaskId> = self
            .pending
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .is_some_and(|t| now - t.submitted_at > timeout)
            })
            .cloned()
            .collect();
        for id in &expired {
            self.reject(id, APPROVAL_TIMEOUT_REASON);
        }
        expired
    }

    /// Pop the next ready task and mark it running.
    pub fn next_dispatch(&mut self) -> Option<TaskRecord> {
        while let Some(task_id) = self.queue.pop() {
            let Some(record) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            if record.status.is_terminal() || record.status == TaskStatus::Running {
                continue;
            }
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
            self.active.insert(task_id);
            return Some(record.clone());
        }
        None
    }

    /// Record a terminal outcome. Returns the dependents that became ready.
    pub fn finish(
        &mut self,
        task_id: &TaskId,
        status: TaskStatus,
        result: Option<TaskResult>,
        error: Option<String>,
    ) -> Vec<TaskId> {
        self.active.remove(task_id);
        let Some(mut record) = self.tasks.remove(task_id) else {
            return Vec::new();
        };
        record.status = status;
        record.completed_at = Some(Utc::now());
        record.error = error.or_else(|| result.as_ref().and_then(|r| r.error.clone()));
        record.result = result;
        self.push_history(record);

        let released = if status == TaskStatus::Completed {
            self.completed_ids.insert(task_id.clone());
            self.graph.complete(task_id)
        } else {
            Vec::new()
        };
        self.graph.forget(task_id);

        let mut queued = Vec::new();
        for dependent in released {
            if let Some(rec) = self.tasks.get(&dependent) {
                if matches!(rec.status, TaskStatus::Queued | TaskStatus::Approved) {
                    self.queue
                        .push(dependent.clone(), rec.priority, rec.sequence);
                    queued.push(dependent);
                }
            }
        }
        queued
    }

    fn push_history(&mut self, record: TaskRecord) {
        self.history.push_back(record);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Drop every task while keeping the ids already handed out and the
    /// submission counter, so no earlier id can be submitted again.
    pub fn clear(&mut self) {
        let seen = std::mem::take(&mut self.seen);
        let next_sequence = self.next_sequence;
        *self = Self::new(self.history_limit);
        self.seen = seen;
        self.next_sequence = next_sequence;
    }

    /// Rebuild from a previous run's document: history and pending
    /// approvals carry over, tasks that were running become failures.
    pub fn restore(
        &mut self,
        history: Vec<TaskRecord>,
        pending: Vec<TaskRecord>,
        interrupted: Vec<TaskRecord>,
    ) {
        let mut terminal = HashSet::new();
        for record in history {
            self.seen.insert(record.task_id.clone());
            terminal.insert(record.task_id.clone());
            if record.status == TaskStatus::Completed {
                self.completed_ids.insert(record.task_id.clone());
            }
            self.push_history(record);
        }

        for mut record in interrupted {
            self.seen.insert(record.task_id.clone());
            terminal.insert(record.task_id.clone());
            record.status = TaskStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error = Some(INTERRUPTED_ERROR.to_string());
            self.push_history(record);
        }

        for mut record in pending {
            if terminal.contains(&record.task_id) || self.tasks.contains_key(&record.task_id) {
                continue;
            }
            record.status = TaskStatus::WaitingApproval;
            record.sequence = self.bump_sequence();
            self.admit(record);
        }
    }

    /// A live task, or the newest retained terminal record with that id.
    pub fn task(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.tasks
            .get(task_id)
            .or_else(|| self.history.iter().rev().find(|t| &t.task_id == task_id))
            .cloned()
    }

    /// Tasks waiting for approval, in submission order.
    pub fn pending(&self) -> Vec<TaskRecord> {
        self.pending
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Running tasks.
    pub fn active(&self) -> BTreeMap<TaskId, TaskRecord> {
        self.active
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|t| (id.clone(), t.clone())))
            .collect()
    }

    /// Retained terminal tasks, oldest first.
    pub fn history(&self) -> Vec<TaskRecord> {
        self.history.iter().cloned().collect()
    }

    /// Number of running tasks.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Counters for [`OrchestratorStatus`](crate::OrchestratorStatus).
    pub fn counts(&self) -> TaskCounts {
        let blocked = self
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Approved))
            .filter(|t| !self.graph.is_satisfied(&t.task_id))
            .count();
        TaskCounts {
            queued: self.queue.len(),
            blocked,
            pending_approval: self.pending.len(),
            active: self.active.len(),
            completed: self.history.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use overseer_core::Priority;

    fn sub(id: &str) -> TaskSubmission {
        TaskSubmission::new("worker").with_id(id)
    }

    fn complete(s: &mut Scheduler, id: &str) -> Vec<TaskId> {
        s.finish(&TaskId::from(id), TaskStatus::Completed, None, None)
    }

    fn dispatch_order(s: &mut Scheduler) -> Vec<String> {
        std::iter::from_fn(|| s.next_dispatch())
            .map(|t| t.task_id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_critical_before_high() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1").with_priority(Priority::High), false).unwrap();
        s.submit(sub("t2").with_priority(Priority::Critical), false).unwrap();
        assert_eq!(dispatch_order(&mut s), vec!["t2", "t1"]);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut s = Scheduler::new(100);
        let a = s.submit(TaskSubmission::new("w"), false).unwrap();
        let b = s.submit(TaskSubmission::new("w"), false).unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task_"));
    }

    #[test]
    fn test_duplicate_id_rejected_even_after_completion() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), false).unwrap();
        s.next_dispatch().unwrap();
        complete(&mut s, "t1");
        let err = s.submit(sub("t1"), false).unwrap_err();
        assert!(matches!(err, OverseerError::DuplicateTask(_)));
    }

    #[test]
    fn test_dependent_waits_then_released() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), false).unwrap();
        s.submit(sub("t3").depends_on("t1").with_priority(Priority::Critical), false)
            .unwrap();
        assert_eq!(s.counts().blocked, 1);

        assert_eq!(dispatch_order(&mut s), vec!["t1"]);
        assert_eq!(s.task(&TaskId::from("t3")).unwrap().status, TaskStatus::Queued);

        assert_eq!(complete(&mut s, "t1"), vec![TaskId::from("t3")]);
        assert_eq!(dispatch_order(&mut s), vec!["t3"]);
    }

    #[test]
    fn test_failed_dependency_starves_dependent() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), false).unwrap();
        s.submit(sub("t2").depends_on("t1"), false).unwrap();
        s.next_dispatch().unwrap();
        let released = s.finish(
            &TaskId::from("t1"),
            TaskStatus::Failed,
            None,
            Some("boom".into()),
        );
        assert!(released.is_empty());
        assert!(s.next_dispatch().is_none());
        assert_eq!(s.counts().blocked, 1);
        assert_eq!(s.task(&TaskId::from("t1")).unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_approval_gates_queue() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), true).unwrap();
        assert!(s.next_dispatch().is_none());
        assert_eq!(s.pending().len(), 1);
        assert_eq!(
            s.task(&TaskId::from("t1")).unwrap().status,
            TaskStatus::WaitingApproval
        );

        assert!(s.approve(&TaskId::from("t1")));
        assert!(!s.approve(&TaskId::from("t1")));
        assert_eq!(dispatch_order(&mut s), vec!["t1"]);
    }

    #[test]
    fn test_released_dependent_awaiting_approval_is_not_queued() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), false).unwrap();
        s.submit(sub("t2").depends_on("t1"), true).unwrap();
        s.next_dispatch().unwrap();
        assert!(complete(&mut s, "t1").is_empty());
        assert!(s.next_dispatch().is_none());

        assert!(s.approve(&TaskId::from("t2")));
        assert_eq!(dispatch_order(&mut s), vec!["t2"]);
    }

    #[test]
    fn test_reject_is_terminal_and_queryable() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), true).unwrap();
        assert!(s.reject(&TaskId::from("t1"), "not today"));
        assert!(!s.reject(&TaskId::from("t1"), "again"));

        let t = s.task(&TaskId::from("t1")).unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert_eq!(t.error.as_deref(), Some("not today"));
        assert!(!s.approve(&TaskId::from("t1")));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut s = Scheduler::new(100);
        s.submit(sub("b").depends_on("a"), false).unwrap();
        let err = s.submit(sub("a").depends_on("b"), false).unwrap_err();
        assert!(matches!(err, OverseerError::DependencyCycle { .. }));
        let err = s.submit(sub("c").depends_on("c"), false).unwrap_err();
        assert!(matches!(err, OverseerError::DependencyCycle { .. }));
        // A rejected id can be submitted again without the cycle.
        s.submit(sub("a"), false).unwrap();
    }

    #[test]
    fn test_expire_approvals() {
        let mut s = Scheduler::new(100);
        s.submit(sub("old"), true).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(120);
        s.submit(sub("new"), true).unwrap();

        let expired = s.expire_approvals(Duration::from_secs(60), later);
        assert_eq!(expired.len(), 2);
        let t = s.task(&TaskId::from("old")).unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert_eq!(t.error.as_deref(), Some(APPROVAL_TIMEOUT_REASON));

        s.submit(sub("fresh"), true).unwrap();
        assert!(s.expire_approvals(Duration::from_secs(60), Utc::now()).is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = Scheduler::new(3);
        for i in 0..5 {
            let id = format!("t{i}");
            s.submit(sub(&id), false).unwrap();
            s.next_dispatch().unwrap();
            complete(&mut s, &id);
        }
        assert_eq!(s.history().len(), 3);
        assert!(s.task(&TaskId::from("t0")).is_none());
        // Evicted completions still satisfy later dependents.
        s.submit(sub("after").depends_on("t0"), false).unwrap();
        assert_eq!(dispatch_order(&mut s), vec!["after"]);
    }

    #[test]
    fn test_clear_keeps_issued_ids() {
        let mut s = Scheduler::new(100);
        s.submit(sub("t1"), true).unwrap();
        let parked = s.pending();
        s.submit(sub("t2"), false).unwrap();

        s.clear();
        assert!(s.task(&TaskId::from("t2")).is_none());
        s.restore(Vec::new(), parked, Vec::new());
        assert_eq!(s.pending().len(), 1);

        let err = s.submit(sub("t2"), false).unwrap_err();
        assert!(matches!(err, OverseerError::DuplicateTask(_)));
        let fresh = s.submit(sub("t3"), false).unwrap();
        assert!(s.task(&fresh).unwrap().sequence > 2);
    }

    #[test]
    fn test_restore() {
        let mut first = Scheduler::new(100);
        first.submit(sub("done"), false).unwrap();
        first.submit(sub("running"), false).unwrap();
        first.submit(sub("waiting").depends_on("done"), true).unwrap();
        first.next_dispatch().unwrap();
        complete(&mut first, "done");
        first.next_dispatch().unwrap();

        let mut s = Scheduler::new(100);
        s.restore(
            first.history(),
            first.pending(),
            first.active().into_values().collect(),
        );

        let interrupted = s.task(&TaskId::from("running")).unwrap();
        assert_eq!(interrupted.status, TaskStatus::Failed);
        assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED_ERROR));

        assert_eq!(s.pending().len(), 1);
        assert!(s.approve(&TaskId::from("waiting")));
        assert_eq!(dispatch_order(&mut s), vec!["waiting"]);
        assert!(s.submit(sub("done"), false).is_err());
    }
}
