//! Batch Context - Aggregate Root

use std::collections::HashMap;

use crate::domain::task::{Task, TaskSnapshot, TaskStatus};

use super::{BatchItemResult, BatchProgress, BatchResult};

/// 批量任务成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMember {
    pub task_id: String,
    pub file_name: String,
}

impl BatchMember {
    pub fn new(task_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            file_name: file_name.into(),
        }
    }
}

/// 批量任务聚合根
///
/// 成员顺序与提交顺序一致。聚合进度只由本聚合计算。
#[derive(Debug, Clone)]
pub struct BatchJob {
    batch_id: String,
    members: Vec<BatchMember>,
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl BatchJob {
    pub fn new(batch_id: impl Into<String>, members: Vec<BatchMember>) -> Self {
        let tasks = members.iter().map(|m| Task::new(m.task_id.clone())).collect();
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.task_id.clone(), i))
            .collect();

        Self {
            batch_id: batch_id.into(),
            members,
            tasks,
            index,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn members(&self) -> &[BatchMember] {
        &self.members
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    /// 应用成员快照；未知成员返回 false
    pub fn apply(&mut self, snapshot: &TaskSnapshot) -> bool {
        match self.index.get(&snapshot.task_id) {
            Some(&i) => {
                self.tasks[i].apply(snapshot);
                true
            }
            None => {
                tracing::warn!(
                    batch_id = %self.batch_id,
                    task_id = %snapshot.task_id,
                    "Snapshot for unknown batch member"
                );
                false
            }
        }
    }

    /// 所有成员都处于终态
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(Task::is_terminal)
    }

    /// 成员进度的算术平均，存在非终态成员时封顶为 99
    pub fn progress(&self) -> u8 {
        if self.tasks.is_empty() {
            return 100;
        }
        let sum: u32 = self.tasks.iter().map(|t| t.progress as u32).sum();
        let mean = (sum / self.tasks.len() as u32).min(100) as u8;
        if self.is_done() {
            100
        } else {
            mean.min(99)
        }
    }

    pub fn progress_view(&self) -> BatchProgress {
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();

        BatchProgress {
            batch_id: self.batch_id.clone(),
            total: self.tasks.len(),
            completed,
            failed,
            progress: self.progress(),
        }
    }

    /// 组装最终结果
    ///
    /// `fetched` 为结果接口返回的（已规范化的）快照；缺失的成员使用轮询得到的终态
    pub fn build_result(&self, fetched: Vec<TaskSnapshot>) -> BatchResult {
        let mut fetched: HashMap<String, TaskSnapshot> = fetched
            .into_iter()
            .map(|s| (s.task_id.clone(), s))
            .collect();

        let items = self
            .members
            .iter()
            .zip(self.tasks.iter())
            .map(|(member, task)| match fetched.remove(&member.task_id) {
                Some(snapshot) if snapshot.is_terminal() => BatchItemResult {
                    task_id: member.task_id.clone(),
                    file_name: member.file_name.clone(),
                    status: snapshot.status,
                    result: snapshot.result,
                    error: snapshot.error,
                },
                _ => BatchItemResult {
                    task_id: member.task_id.clone(),
                    file_name: member.file_name.clone(),
                    status: task.status,
                    result: task.result.clone(),
                    error: task.error.clone(),
                },
            })
            .collect();

        BatchResult {
            batch_id: self.batch_id.clone(),
            items,
        }
    }
}
