//! 阶段运行统计.

use log::info;
use std::time::{Duration, Instant};

/// 一个已完成阶段的统计.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageStats {
    name: &'static str,
    items: usize,
    elapsed: Duration,
}

impl StageStats {
    /// 由已知的耗时构建.
    #[inline]
    pub const fn new(name: &'static str, items: usize, elapsed: Duration) -> Self {
        Self {
            name,
            items,
            elapsed,
        }
    }

    /// 阶段名.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// 阶段产出个数 (实体, 流水线步数, patch 等).
    #[inline]
    pub const fn items(&self) -> usize {
        self.items
    }

    /// 阶段耗时.
    #[inline]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 每秒产出个数. 耗时为零时返回 `None`.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.items as f64 / secs)
    }
}

/// 计时执行阶段 `name`.
///
/// `f` 返回阶段的值与产出个数. 失败时不产生统计, 错误原样返回.
pub fn timed<T, E, F>(name: &'static str, f: F) -> Result<(T, StageStats), E>
where
    F: FnOnce() -> Result<(T, usize), E>,
{
    let since = Instant::now();
    let (v, items) = f()?;
    let stats = StageStats::new(name, items, since.elapsed());
    info!("Stage `{name}` produced {items} in {} ms", stats.elapsed.as_millis());
    Ok((v, stats))
}
