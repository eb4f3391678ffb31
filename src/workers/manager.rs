// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::workers::worker::Worker;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 启动后台工作器并通过共享的关闭信号统一停止
pub struct WorkerManager {
    shutdown: watch::Sender<bool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// 订阅关闭信号，供其他后台任务使用
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// 启动工作器
    ///
    /// # 参数
    ///
    /// * `worker` - 要启动的工作器
    pub fn start<W: Worker + 'static>(&mut self, worker: Arc<W>) {
        let name = worker.name().to_string();
        let shutdown = self.shutdown.subscribe();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Worker {} started", task_name);
            match worker.run(shutdown).await {
                Ok(()) => info!("Worker {} stopped", task_name),
                Err(e) => error!("Worker {} exited with error: {}", task_name, e),
            }
        });
        self.handles.push((name, handle));
    }

    /// 已启动的工作器数量
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 发送关闭信号并等待所有工作器退出
    pub async fn shutdown(self) {
        info!("Shutting down workers...");
        let _ = self.shutdown.send(true);

        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Worker {} panicked: {}", name, e);
            }
        }
        info!("Workers shut down successfully");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::WorkerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct WaitForShutdown {
        stopped: AtomicBool,
    }

    #[async_trait]
    impl Worker for WaitForShutdown {
        async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "wait_for_shutdown"
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_workers() {
        let mut manager = WorkerManager::new();
        let a = Arc::new(WaitForShutdown::default());
        let b = Arc::new(WaitForShutdown::default());
        manager.start(a.clone());
        manager.start(b.clone());
        assert_eq!(manager.len(), 2);

        manager.shutdown().await;
        assert!(a.stopped.load(Ordering::SeqCst));
        assert!(b.stopped.load(Ordering::SeqCst));
    }
}
