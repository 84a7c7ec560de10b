//! Patch 流水线.
//!
//! 流水线持有一组有序的变换和一个当前 [`Patch`]. 每次推进会取出下一个变换,
//! 作用于当前 `Patch`, 并用变换的返回值替换之, 直到变换序列耗尽.
//!
//! 流水线只能运行一次: 变换序列在运行中被消耗, 重新运行需要构造新的流水线.
//! 流水线不做并行, 不做部分失败处理. 任一变换失败都会终止整个序列,
//! 错误原样返回给调用方, 当前 payload 保持为最后一次成功的结果.

mod ops;
mod patch;

pub use ops::{mask_pipeline_specs, OpSpec};
pub use patch::{Features, Patch};

use crate::error::SurvosError;
use crate::SurvosResult;
use log::{debug, warn};
use std::fmt;

/// 作用于 [`Patch`] 的单个变换.
pub trait PatchOp: Send {
    /// 变换名, 用于日志和错误信息.
    fn name(&self) -> &str;

    /// 消费自身, 将 `patch` 变换为新的 `Patch`.
    fn apply(self: Box<Self>, patch: Patch) -> SurvosResult<Patch>;
}

/// 类型擦除后的变换.
pub type BoxedOp = Box<dyn PatchOp>;

/// 将闭包包装为 [`PatchOp`].
pub struct FnOp<F> {
    name: String,
    f: F,
}

impl<F> PatchOp for FnOp<F>
where
    F: FnOnce(Patch) -> SurvosResult<Patch> + Send,
{
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn apply(self: Box<Self>, patch: Patch) -> SurvosResult<Patch> {
        (self.f)(patch)
    }
}

/// 由闭包 `f` 构建名为 `name` 的变换.
pub fn op_fn<F>(name: impl Into<String>, f: F) -> BoxedOp
where
    F: FnOnce(Patch) -> SurvosResult<Patch> + Send + 'static,
{
    Box::new(FnOp {
        name: name.into(),
        f,
    })
}

/// 流水线参数.
#[derive(Default)]
pub struct PipelineParams {
    /// 流水线名.
    pub name: String,

    /// 有序的变换序列.
    pub ordered_ops: Vec<BoxedOp>,
}

impl fmt::Debug for PipelineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineParams")
            .field("name", &self.name)
            .field(
                "ordered_ops",
                &self.ordered_ops.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PipelineParams {
    /// 由变换序列构建.
    pub fn new(name: impl Into<String>, ordered_ops: Vec<BoxedOp>) -> Self {
        Self {
            name: name.into(),
            ordered_ops,
        }
    }

    /// 由配置中的变换描述构建.
    pub fn from_specs<I: IntoIterator<Item = OpSpec>>(name: impl Into<String>, specs: I) -> Self {
        Self::new(
            name,
            specs
                .into_iter()
                .map(|s| Box::new(s) as BoxedOp)
                .collect(),
        )
    }

    /// 在末尾追加一个变换.
    pub fn then(mut self, op: BoxedOp) -> Self {
        self.ordered_ops.push(op);
        self
    }
}

/// 流水线中已完成的一步.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// 变换在序列中的下标.
    pub index: usize,

    /// 变换名.
    pub op: String,
}

/// 只能运行一次的 Patch 流水线. 以迭代器协议推进.
///
/// ```
/// use survos_core::pipeline::{op_fn, Patch, Pipeline, PipelineParams};
/// use survos_core::volume::Vol;
///
/// let params = PipelineParams::new(
///     "demo",
///     vec![op_fn("double", |mut p: Patch| {
///         p.image_mut("Main")?.mapv_inplace(|v| v * 2.0);
///         Ok(p)
///     })],
/// );
/// let mut pipeline = Pipeline::new(params);
/// pipeline.init_payload(Patch::from_image("Main", Vol::ones((1, 1, 2))));
/// let out = pipeline.run().unwrap();
/// assert_eq!(out.image("Main").unwrap().sum(), 4.0);
/// ```
pub struct Pipeline {
    name: String,
    ordered_ops: std::vec::IntoIter<BoxedOp>,
    payload: Option<Patch>,
    completed: usize,
    halted: bool,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("remaining", &self.ordered_ops.len())
            .field("completed", &self.completed)
            .field("halted", &self.halted)
            .finish()
    }
}

impl Pipeline {
    /// 由参数构建. 此时尚无 payload.
    pub fn new(params: PipelineParams) -> Self {
        Self {
            name: params.name,
            ordered_ops: params.ordered_ops.into_iter(),
            payload: None,
            completed: 0,
            halted: false,
        }
    }

    /// 设置 (或替换) 当前 payload.
    #[inline]
    pub fn init_payload(&mut self, patch: Patch) {
        self.payload = Some(patch);
    }

    /// 获取当前 payload. 尚未设置时返回 `None`.
    ///
    /// 某一步失败后, 返回失败之前最后一次成功的结果.
    #[inline]
    pub fn output_result(&self) -> Option<&Patch> {
        self.payload.as_ref()
    }

    /// 消费流水线, 取出当前 payload.
    #[inline]
    pub fn into_result(self) -> Option<Patch> {
        self.payload
    }

    /// 流水线名.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 尚未执行的变换个数.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.ordered_ops.len()
    }

    /// 已成功执行的变换个数.
    #[inline]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// 是否已因错误而终止.
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 推进到序列耗尽, 返回最终 payload. 遇到第一个错误即返回该错误.
    pub fn run(mut self) -> SurvosResult<Patch> {
        for step in &mut self {
            step?;
        }
        self.payload.ok_or(SurvosError::NoPayload)
    }
}

impl Iterator for Pipeline {
    type Item = SurvosResult<Step>;

    /// 执行下一个变换.
    ///
    /// 序列耗尽后返回 `None`. 若没有 payload, 或者变换失败, 则返回对应错误,
    /// 并且之后的所有调用都返回 `None`. 变换作用于 payload 的副本,
    /// 失败时 payload 不变.
    fn next(&mut self) -> Option<Self::Item> {
        if self.halted || self.ordered_ops.len() == 0 {
            return None;
        }
        let Some(patch) = self.payload.take() else {
            self.halted = true;
            return Some(Err(SurvosError::NoPayload));
        };
        let op = self.ordered_ops.next()?;
        let index = self.completed;
        let name = op.name().to_string();
        debug!("[{}] step {index}: `{name}`", self.name);

        match op.apply(patch.clone()) {
            Ok(p) => {
                self.payload = Some(p);
                self.completed += 1;
                Some(Ok(Step { index, op: name }))
            }
            Err(e) => {
                warn!("[{}] step {index}: `{name}` failed: {e}", self.name);
                self.payload = Some(patch);
                self.halted = true;
                Some(Err(SurvosError::Op(name, Box::new(e))))
            }
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.halted {
            (0, Some(0))
        } else {
            (0, Some(self.ordered_ops.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Vol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn add(name: &str, delta: f32) -> BoxedOp {
        op_fn(name.to_string(), move |mut p: Patch| {
            p.image_mut("Main")?.mapv_inplace(|v| v + delta);
            Ok(p)
        })
    }

    fn payload() -> Patch {
        Patch::from_image("Main", Vol::zeros((1, 2, 2)))
    }

    #[test]
    fn test_pipeline_steps_in_order() {
        let params = PipelineParams::new("t", vec![add("a", 1.0), add("b", 2.0)]).then(op_fn(
            "scale",
            |mut p: Patch| {
                p.image_mut("Main")?.mapv_inplace(|v| v * 10.0);
                Ok(p)
            },
        ));
        let mut pl = Pipeline::new(params);
        pl.init_payload(payload());
        assert_eq!(pl.remaining(), 3);

        let s = pl.next().unwrap().unwrap();
        assert_eq!(s, Step { index: 0, op: "a".into() });
        assert_eq!(pl.output_result().unwrap().image("Main").unwrap()[[0, 0, 0]], 1.0);

        let names: Vec<_> = pl.by_ref().map(|s| s.unwrap().op).collect();
        assert_eq!(names, ["b", "scale"]);
        assert_eq!(pl.completed(), 3);
        // (0 + 1 + 2) * 10
        assert_eq!(pl.output_result().unwrap().image("Main").unwrap()[[0, 1, 1]], 30.0);

        // 耗尽后不可重启.
        assert!(pl.next().is_none());
        assert!(pl.next().is_none());
    }

    #[test]
    fn test_pipeline_error_aborts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let params = PipelineParams::new(
            "t",
            vec![
                add("a", 1.0),
                op_fn("needs-missing", |p: Patch| {
                    p.image("missing")?;
                    Ok(p)
                }),
                op_fn("never", move |p: Patch| {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(p)
                }),
            ],
        );
        let mut pl = Pipeline::new(params);
        pl.init_payload(payload());
        assert!(pl.next().unwrap().is_ok());
        match pl.next() {
            Some(Err(SurvosError::Op(name, inner))) => {
                assert_eq!(name, "needs-missing");
                assert!(matches!(*inner, SurvosError::MissingLayer(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(pl.is_halted());
        assert!(pl.next().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pipeline_keeps_last_good_payload() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
        let params = PipelineParams::new(
            "t",
            vec![
                add("a", 1.0),
                add("b", 2.0),
                op_fn("half-done", |mut p: Patch| {
                    p.image_mut("Main")?.fill(-1.0);
                    Err(SurvosError::invalid("half-done"))
                }),
                add("c", 4.0),
            ],
        );
        let mut pl = Pipeline::new(params);
        pl.init_payload(payload());
        let steps: Vec<_> = pl.by_ref().collect();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[2], Err(SurvosError::Op(name, _)) if name == "half-done"));
        assert_eq!(pl.completed(), 2);
        assert_eq!(pl.remaining(), 1);

        // 失败变换对副本的修改不可见.
        let out = pl.into_result().unwrap();
        assert!(out.image("Main").unwrap().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_pipeline_without_payload() {
        let mut pl = Pipeline::new(PipelineParams::new("t", vec![add("a", 1.0)]));
        assert!(matches!(pl.next(), Some(Err(SurvosError::NoPayload))));
        assert!(pl.next().is_none());

        let pl = Pipeline::new(PipelineParams::new("t", vec![add("a", 1.0)]));
        assert!(matches!(pl.run(), Err(SurvosError::NoPayload)));
    }

    #[test]
    fn test_pipeline_run_empty_and_replace_payload() {
        let mut pl = Pipeline::new(PipelineParams::default());
        pl.init_payload(payload());
        pl.init_payload(Patch::from_image("Main", Vol::ones((1, 1, 1))));
        let out = pl.run().unwrap();
        assert_eq!(out.image("Main").unwrap().dim(), (1, 1, 1));
    }

    #[test]
    fn test_pipeline_run_error() {
        let params = PipelineParams::new(
            "t",
            vec![op_fn("boom", |_p: Patch| Err(SurvosError::invalid("boom")))],
        );
        let mut pl = Pipeline::new(params);
        pl.init_payload(payload());
        assert!(matches!(pl.run(), Err(SurvosError::Op(name, _)) if name == "boom"));
    }
}
