#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供体数据 (电镜/CT) 标注工作流中实体采样, 伪标签生成与 Patch 流水线的实现.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有三维索引均按 `(z, x, y)` 组织, 即 `vol[[z, x, y]]`.
//!   实体点按 `(z, x, y, class_code)` 组织.
//! 2. 在非期望情况下 (违反文档中声明的前置条件), 程序会直接 panic.
//!   可恢复的错误统一通过 [`SurvosError`] 返回.
//!
//! # 开发计划
//!
//! ### Patch 流水线 ✅
//!
//! 由有序变换组成的单次流水线, 以迭代器形式推进. 任一变换失败即终止.
//!
//! 实现位于 `survos-core/src/pipeline`.
//!
//! ### 体数据基础操作 ✅
//!
//! 填充, 裁剪, 翻转, 包围盒可视化, 最大连通域, 三维形态学与中值滤波.
//!
//! 实现位于 `survos-core/src/volume`.
//!
//! ### 实体点采样与训练集制作 ✅
//!
//! 1. 实体点的偏移, 缩放, 裁剪与按类别整理. ✅
//! 2. 以实体点为中心采样 patch, 随机偏移与翻转增强. ✅
//! 3. 训练/测试集划分, npz 导出与元数据快照. ✅
//! 4. 数据集与批加载器. ✅
//!
//! 实现位于 `survos-core/src/entity`.
//!
//! ### 伪标签 ✅
//!
//! 以实体点为中心绘制椭球掩膜, 区分核心与外壳. 支持外部 ACWE 精化钩子.
//!
//! 实现位于 `survos-core/src/entity/anno/pseudo.rs`.
//!
//! ### 众包点击数据 ✅
//!
//! 会话记录解析, 点击 patch 截取, 分屏动画导出.
//!
//! 实现位于 `survos-core/src/entity/anno/crowd.rs`.
//!
//! ### 配置 ✅
//!
//! 多个 YAML 文档合并得到的强类型配置.
//!
//! 实现位于 `survos-core/src/config.rs`.

/// 三维索引 `(z, x, y)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 本 crate 的结果类型.
pub type SurvosResult<T> = Result<T, SurvosError>;

pub mod config;
pub mod consts;
pub mod entity;
mod error;
pub mod pipeline;
pub mod prelude;
pub mod volume;

pub use error::SurvosError;
