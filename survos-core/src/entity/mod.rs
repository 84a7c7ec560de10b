//! 实体 (带类别码的标注点) 相关的处理.
//!
//! 1. 点的偏移, 裁剪, 按类别整理 ([`points`]).
//! 2. 以点为中心采样 patch 并制作训练集 ([`patches`], [`dataset`]).
//! 3. 由点生成伪标签 ([`anno`]).

pub mod anno;
pub mod dataset;
mod meta;
pub mod patches;
pub mod points;
pub mod sampler;

pub use dataset::{DataLoader, SmallVolDataset, VolDataset};
pub use meta::{EntityMeta, EntityMetaMap};
pub use patches::{init_entity_workflow, make_patches, PatchParams, PatchSet, PatchWorkflow, WorkflowParams};
pub use points::{organize_entities, EntityPoint};
