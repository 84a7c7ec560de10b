//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, SurvosError, SurvosResult};

pub use crate::config::AppConfig;
pub use crate::consts::{label, layer};

pub use crate::pipeline::{op_fn, OpSpec, Patch, PatchOp, Pipeline, PipelineParams};
pub use crate::volume::{BoundingVolume, LabelVol, RoiBox, Vol};

pub use crate::entity::anno::{AnnoParams, Click};
pub use crate::entity::{
    DataLoader, EntityMeta, EntityMetaMap, EntityPoint, PatchParams, PatchSet, PatchWorkflow,
    SmallVolDataset, VolDataset, WorkflowParams,
};
