//! 运行时错误.

use crate::Idx3d;
use thiserror::Error;

/// 流水线, 采样与配置加载的运行时错误.
#[derive(Debug, Error)]
pub enum SurvosError {
    /// `Patch` 中不存在所需的图层. 参数为图层名.
    #[error("patch 中不存在图层 `{0}`")]
    MissingLayer(String),

    /// 流水线尚未通过 `init_payload` 设置 payload.
    #[error("pipeline 尚未设置 payload")]
    NoPayload,

    /// 两个体数据的形状不一致.
    ///
    /// 第一个参数代表期望的形状, 第二个参数代表实际的形状.
    #[error("形状不一致: 期望 {0:?}, 实际 {1:?}")]
    ShapeMismatch(Idx3d, Idx3d),

    /// 包围盒 (部分) 位于体数据之外.
    #[error("包围盒 {bvol:?} 超出体数据范围 {shape:?}")]
    OutOfBounds {
        /// 包围盒 `[z_st, x_st, y_st, z_end, x_end, y_end]`.
        bvol: [i64; 6],
        /// 体数据形状.
        shape: Idx3d,
    },

    /// 参数非法.
    #[error("参数非法: {0}")]
    InvalidArgument(String),

    /// 流水线某一步失败. 第一个参数为操作名.
    #[error("操作 `{0}` 失败: {1}")]
    Op(String, Box<SurvosError>),

    /// 元组字面量解析失败. 参数为出错的位置与原因.
    #[error("元组解析失败 (位置 {0}): {1}")]
    Parse(usize, String),

    /// YAML 配置错误.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// npz/npy 写入错误.
    #[error(transparent)]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// npy 写入错误.
    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    /// npy 读取错误.
    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    /// 元数据快照编码错误.
    #[error(transparent)]
    Snapshot(#[from] bincode::Error),

    /// 图像保存错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SurvosError {
    /// 构造 [`SurvosError::InvalidArgument`].
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
