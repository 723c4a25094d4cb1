use crate::utils::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// 单次刷新的进度，单位是万分之一
#[derive(Debug, Default)]
pub struct RefreshProgress {
    value: AtomicU32,
}

impl RefreshProgress {
    pub const DATABASES_DONE: u32 = 1_000;
    pub const TABLES_DONE: u32 = 3_000;
    pub const PARTITIONS_DONE: u32 = 9_000;
    pub const COMPLETE: u32 = 10_000;

    /// 只会前进，不会回退
    pub fn mark(&self, value: u32) {
        self.value.fetch_max(value.min(Self::COMPLETE), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: u32) {
        let _ = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_add(delta).min(Self::COMPLETE))
            });
    }

    /// 百分比，两位小数
    pub fn percentage(&self) -> f64 {
        self.value.load(Ordering::SeqCst) as f64 / 100.0
    }

    /// 把 [from, to) 的进度平均分给 `parts` 份
    pub fn step(from: u32, to: u32, parts: usize) -> u32 {
        if parts == 0 {
            return 0;
        }
        (to.saturating_sub(from) as usize / parts) as u32
    }
}

/// 正在进行的刷新，按数据源名字登记
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    running: Mutex<HashMap<String, Arc<RefreshProgress>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次刷新；同一个数据源已有刷新在跑时拒绝
    pub fn start(self: &Arc<Self>, name: &str) -> Result<ProgressGuard> {
        let mut running = self.lock();
        if running.contains_key(name) {
            return Err(AppError::RefreshInProgress(name.to_string()));
        }

        let progress = Arc::new(RefreshProgress::default());
        running.insert(name.to_string(), progress.clone());

        Ok(ProgressGuard {
            registry: self.clone(),
            name: name.to_string(),
            progress,
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.lock().get(name).map(|p| p.percentage())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<RefreshProgress>>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// 刷新结束（包括出错）时自动注销
pub struct ProgressGuard {
    registry: Arc<ProgressRegistry>,
    name: String,
    progress: Arc<RefreshProgress>,
}

impl ProgressGuard {
    pub fn progress(&self) -> &Arc<RefreshProgress> {
        &self.progress
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}
