//! 运行结果.

use crate::stage::StageStats;
use std::io::{self, Write};
use std::path::PathBuf;

/// 将阶段统计写进 `w` 中.
fn describe_into<W: Write>(s: &StageStats, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Stage `{}`:", s.name())?;
    writeln!(w, "{S4}Produced: {}", s.items())?;
    writeln!(w, "{S4}Time: {} ms", s.elapsed().as_millis())?;
    let t = s
        .throughput()
        .map_or_else(|| "/".to_string(), |v| format!("{v:.1}"));
    write!(w, "{S4}Throughput: {t} per second")?;
    Ok(())
}

/// 一次完整运行的结果.
pub struct RunResult {
    stages: Vec<StageStats>,
    outputs: Vec<PathBuf>,
}

impl RunResult {
    /// 初始化.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// 记录一个阶段.
    pub fn push_stage(&mut self, stats: StageStats) {
        self.stages.push(stats);
    }

    /// 记录输出文件.
    pub fn push_output(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    /// 将运行结果写进 `w` 中.
    pub fn analyze_into<W: Write>(&self, mut w: W) -> io::Result<()> {
        utils::sep_to(&mut w)?;
        for stats in self.stages.iter() {
            describe_into(stats, &mut w)?;
            writeln!(w)?;
            utils::sep_to(&mut w)?;
        }
        for p in self.outputs.iter() {
            writeln!(w, "Saved {}", p.display())?;
        }
        Ok(())
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        self.analyze_into(io::stdout().lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_analyze_into() {
        let mut r = RunResult::new();
        r.push_stage(StageStats::new("patches", 4, Duration::from_secs(2)));
        r.push_stage(StageStats::new("noop", 0, Duration::ZERO));
        r.push_output(PathBuf::from("a.npz"));

        let mut buf = Vec::new();
        r.analyze_into(&mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.contains("Stage `patches`:"));
        assert!(s.contains("Produced: 4"));
        assert!(s.contains("Time: 2000 ms"));
        assert!(s.contains("Throughput: 2.0 per second"));
        assert!(s.contains("Throughput: / per second"));
        assert!(s.ends_with("Saved a.npz\n"));
    }
}
