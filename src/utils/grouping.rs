//! 把分区切成有上限的批次，每一批生成一个任务

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 按个数分组：返回 ceil(n / group_size) 组，保持输入顺序
pub fn group<T>(items: Vec<T>, group_size: usize) -> Vec<Vec<T>> {
    let group_size = group_size.max(1);
    let mut groups = Vec::with_capacity(items.len().div_ceil(group_size));
    let mut current = Vec::with_capacity(group_size.min(items.len()));

    for item in items {
        current.push(item);
        if current.len() == group_size {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// 分组策略：个数上限，加上可选的大小上限
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionGrouping {
    pub max_num: usize,
    pub max_size_bytes: Option<i64>,
}

impl PartitionGrouping {
    pub fn new(max_num: usize, max_size_gb: Option<f64>) -> Self {
        Self {
            max_num: max_num.max(1),
            max_size_bytes: max_size_gb
                .filter(|gb| *gb > 0.0)
                .map(|gb| (gb * GB) as i64),
        }
    }

    /// 累计大小达到上限或个数达到上限时关闭当前组，大小未知的按 0 计
    pub fn group<T>(&self, items: Vec<T>, size_of: impl Fn(&T) -> Option<i64>) -> Vec<Vec<T>> {
        let Some(max_size) = self.max_size_bytes else {
            return group(items, self.max_num);
        };

        let mut groups = Vec::new();
        let mut current = Vec::new();
        let mut size = 0i64;

        for item in items {
            size = size.saturating_add(size_of(&item).unwrap_or(0));
            current.push(item);

            if size >= max_size || current.len() >= self.max_num {
                groups.push(std::mem::take(&mut current));
                size = 0;
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }
}
