// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// 进程内的待处理主体表
///
/// 记录主体到其排队任务的映射，用于合并重复的入队请求。
/// 不持久化，重启后为空；队列本身的按主体查询是最终依据。
#[derive(Default)]
pub struct PendingSubjects {
    inner: Mutex<HashMap<String, Uuid>>,
}

impl PendingSubjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject_id: &str) -> Option<Uuid> {
        self.inner.lock().get(subject_id).copied()
    }

    pub fn insert(&self, subject_id: impl Into<String>, job_id: Uuid) {
        self.inner.lock().insert(subject_id.into(), job_id);
    }

    /// 仅当映射仍指向该任务时移除
    pub fn remove_if(&self, subject_id: &str, job_id: Uuid) -> bool {
        let mut guard = self.inner.lock();
        if guard.get(subject_id) == Some(&job_id) {
            guard.remove(subject_id);
            true
        } else {
            false
        }
    }

    pub fn remove(&self, subject_id: &str) {
        self.inner.lock().remove(subject_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_if_ignores_newer_job() {
        let pending = PendingSubjects::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        pending.insert("s1", old);
        pending.insert("s1", new);
        assert!(!pending.remove_if("s1", old));
        assert_eq!(pending.get("s1"), Some(new));

        assert!(pending.remove_if("s1", new));
        assert!(pending.is_empty());
    }
}
