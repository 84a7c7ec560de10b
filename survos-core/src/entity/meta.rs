//! 实体类别元信息.

use super::EntityPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个实体类别的元信息.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// 类别名.
    pub name: String,

    /// 伪标签掩膜的大小 (椭球直径).
    pub size: [usize; 3],

    /// 伪标签核心区域半径. 为 `None` 时使用调用方给出的默认值.
    #[serde(default)]
    pub core_radius: Option<[usize; 3]>,

    /// 该类别的实体点. 由 [`super::organize_entities`] 填充.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityPoint>,
}

impl EntityMeta {
    /// 构建不含实体点的元信息.
    pub fn new(name: impl Into<String>, size: [usize; 3]) -> Self {
        Self {
            name: name.into(),
            size,
            core_radius: None,
            entities: Vec::new(),
        }
    }

    /// 设置核心区域半径.
    pub fn with_core_radius(mut self, r: [usize; 3]) -> Self {
        self.core_radius = Some(r);
        self
    }
}

/// 以类别码字符串 (如 `"0"`) 为键的元信息表. 键的字典序即类别的处理顺序.
pub type EntityMetaMap = BTreeMap<String, EntityMeta>;
