use crate::entity::EntityPoint;
use crate::error::SurvosError;
use crate::volume::{LabelVol, Vol};
use crate::{Idx3d, SurvosResult};
use ndarray::{Array4, Axis};
use std::collections::BTreeMap;

/// 预先计算好的特征体数据栈. 每个特征有一个名字.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "array-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Features {
    names: Vec<String>,
    layers: Vec<Vol>,
}

impl Features {
    /// 创建空特征栈.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个特征. 若形状与已有特征不一致则返回 `Err`.
    pub fn push(&mut self, name: impl Into<String>, layer: Vol) -> SurvosResult<()> {
        if let Some(first) = self.layers.first() {
            if first.dim() != layer.dim() {
                return Err(SurvosError::ShapeMismatch(first.dim(), layer.dim()));
            }
        }
        self.names.push(name.into());
        self.layers.push(layer);
        Ok(())
    }

    /// 特征个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// 按名字获取特征.
    pub fn get(&self, name: &str) -> Option<&Vol> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.layers[idx])
    }

    /// 按加入顺序迭代 `(名字, 特征)`.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Vol)> {
        self.names.iter().map(String::as_str).zip(self.layers.iter())
    }

    /// 沿第一个轴堆叠所有特征. 若为空则返回 `None`.
    pub fn stack(&self) -> Option<Array4<f32>> {
        let views: Vec<_> = self.layers.iter().map(|l| l.view()).collect();
        ndarray::stack(Axis(0), &views).ok()
    }
}

/// 流水线处理的对象.
///
/// 包含三类按名字索引的图层 (浮点图像, 整数标注, 几何点集) 以及一个可选的特征栈.
/// 各图层之间不强制任何一致性; 流水线中的各个操作通过约定俗成的图层名
/// (见 [`crate::consts::layer`]) 协作.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "array-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// 浮点图像图层.
    pub image_layers: BTreeMap<String, Vol>,

    /// 整数标注图层.
    pub annotation_layers: BTreeMap<String, LabelVol>,

    /// 几何图层 (实体点集).
    pub geometry_layers: BTreeMap<String, Vec<EntityPoint>>,

    /// 特征栈.
    pub features: Option<Features>,
}

macro_rules! layer_access {
    ($field: ident, $ty: ty, $get: ident, $get_mut: ident, $set: ident, $take: ident) => {
        /// 按名字获取图层. 不存在时返回 [`SurvosError::MissingLayer`].
        pub fn $get(&self, name: &str) -> SurvosResult<&$ty> {
            self.$field
                .get(name)
                .ok_or_else(|| SurvosError::MissingLayer(name.to_string()))
        }

        /// 按名字获取可变图层. 不存在时返回 [`SurvosError::MissingLayer`].
        pub fn $get_mut(&mut self, name: &str) -> SurvosResult<&mut $ty> {
            self.$field
                .get_mut(name)
                .ok_or_else(|| SurvosError::MissingLayer(name.to_string()))
        }

        /// 设置 (或覆盖) 图层, 返回旧值.
        #[inline]
        pub fn $set(&mut self, name: impl Into<String>, layer: $ty) -> Option<$ty> {
            self.$field.insert(name.into(), layer)
        }

        /// 移出图层. 不存在时返回 [`SurvosError::MissingLayer`].
        pub fn $take(&mut self, name: &str) -> SurvosResult<$ty> {
            self.$field
                .remove(name)
                .ok_or_else(|| SurvosError::MissingLayer(name.to_string()))
        }
    };
}

impl Patch {
    /// 由三类图层和特征栈直接构建.
    pub fn new(
        image_layers: BTreeMap<String, Vol>,
        annotation_layers: BTreeMap<String, LabelVol>,
        geometry_layers: BTreeMap<String, Vec<EntityPoint>>,
        features: Option<Features>,
    ) -> Self {
        Self {
            image_layers,
            annotation_layers,
            geometry_layers,
            features,
        }
    }

    /// 以单个图像图层构建.
    pub fn from_image(name: impl Into<String>, vol: Vol) -> Self {
        let mut p = Self::default();
        p.set_image(name, vol);
        p
    }

    layer_access!(image_layers, Vol, image, image_mut, set_image, take_image);
    layer_access!(
        annotation_layers,
        LabelVol,
        annotation,
        annotation_mut,
        set_annotation,
        take_annotation
    );
    layer_access!(
        geometry_layers,
        Vec<EntityPoint>,
        geometry,
        geometry_mut,
        set_geometry,
        take_geometry
    );

    /// 空间形状: 第一个图像图层 (按名字排序) 的形状; 若无图像图层则取第一个标注图层.
    pub fn spatial_shape(&self) -> Option<Idx3d> {
        self.image_layers
            .values()
            .next()
            .map(|v| v.dim())
            .or_else(|| self.annotation_layers.values().next().map(|v| v.dim()))
    }

    /// 是否不含任何图层.
    pub fn is_empty(&self) -> bool {
        self.image_layers.is_empty()
            && self.annotation_layers.is_empty()
            && self.geometry_layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Features, Patch};
    use crate::error::SurvosError;
    use crate::volume::Vol;

    #[test]
    fn test_patch_layers() {
        let mut p = Patch::from_image("Main", Vol::ones((2, 3, 4)));
        assert_eq!(p.spatial_shape(), Some((2, 3, 4)));
        assert!(p.image("Main").is_ok());
        assert!(matches!(
            p.image("missing"),
            Err(SurvosError::MissingLayer(name)) if name == "missing"
        ));

        let old = p.set_image("Main", Vol::zeros((1, 1, 1)));
        assert!(old.is_some());
        let taken = p.take_image("Main").unwrap();
        assert_eq!(taken.dim(), (1, 1, 1));
        assert!(p.is_empty());
    }

    #[test]
    fn test_features() {
        let mut f = Features::new();
        f.push("gaussian", Vol::zeros((2, 2, 2))).unwrap();
        f.push("laplacian", Vol::ones((2, 2, 2))).unwrap();
        assert!(f.push("bad", Vol::ones((3, 2, 2))).is_err());
        assert_eq!(f.len(), 2);
        assert_eq!(f.get("laplacian").unwrap().sum(), 8.0);
        assert_eq!(f.stack().unwrap().dim(), (2, 2, 2, 2));
        let names: Vec<_> = f.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["gaussian", "laplacian"]);
    }

    #[cfg(feature = "array-serde")]
    #[test]
    fn test_patch_yaml() {
        use crate::entity::EntityPoint;

        let mut p = Patch::from_image("Main", Vol::ones((2, 2, 2)));
        p.set_geometry("Points", vec![EntityPoint::new(1.0, 0.0, 1.0, 2)]);
        let text = serde_yaml::to_string(&p).unwrap();
        let back: Patch = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.image("Main").unwrap(), p.image("Main").unwrap());
        assert_eq!(back.geometry("Points").unwrap()[0].class_code, 2);
    }
}
