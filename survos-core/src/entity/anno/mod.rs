//! 标注生成: 由实体点生成伪标签 ([`pseudo`]), 以及众包点击数据的整理 ([`crowd`]).

pub mod crowd;
pub mod pseudo;

pub use crowd::{Click, FrameWrite, Literal};
pub use pseudo::{
    generate_annotation_volume, generate_anno, make_anno, make_pseudomasks, AnnoParams,
    AnnotationVolume, PseudoMasks,
};
