//! 训练数据集与批加载器.
//!
//! 数据集只负责按下标切片/采样, 不涉及任何模型. 加载器按批次迭代数据集,
//! 可选地以给定随机数发生器打乱顺序.

use crate::volume::{sample_bounding_volume, BoundingVolume, Vol};
use crate::Idx3d;
use ndarray::{s, stack, Array2, Array3, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

/// 可按下标访问的数据集.
pub trait VolDataset {
    /// 单个样本.
    type Item;

    /// 样本个数.
    fn len(&self) -> usize;

    /// 获取第 `idx` 个样本. 越界时返回 `None`.
    fn get(&self, idx: usize) -> Option<Self::Item>;

    /// 是否为空.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 作用于单个体数据的变换.
pub type VolTransform = Box<dyn Fn(Vol) -> Vol + Send + Sync>;

/// 二维切片复制为三通道, 得到 `(3, h, w)`.
fn three_channel(slice: ndarray::ArrayView2<f32>) -> Vol {
    // 同一视图堆叠三次, 不会失败.
    stack(Axis(0), &[slice, slice, slice]).unwrap_or_else(|_| Vol::zeros((0, 0, 0)))
}

/// 样本维度.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDim {
    /// 整个三维 patch.
    Vol3d,

    /// patch 中的一个 z 切片, 复制为三通道.
    Slice2d(usize),
}

/// 小体数据 (patch) 数据集. 样本为 `(image, label)`.
pub struct SmallVolDataset {
    images: Vec<Vol>,
    labels: Vec<Vol>,
    dim: SampleDim,
    transform: Option<VolTransform>,

    /// 标签中出现的类别.
    pub class_names: Vec<u32>,
}

impl std::fmt::Debug for SmallVolDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmallVolDataset")
            .field("len", &self.images.len())
            .field("dim", &self.dim)
            .field("class_names", &self.class_names)
            .finish()
    }
}

impl SmallVolDataset {
    /// 构建三维数据集.
    ///
    /// # 注意
    ///
    /// `images` 与 `labels` 长度必须一致, 否则程序 panic.
    pub fn new(images: Vec<Vol>, labels: Vec<Vol>) -> Self {
        assert_eq!(images.len(), labels.len(), "图像与标签个数不一致");
        Self {
            images,
            labels,
            dim: SampleDim::Vol3d,
            transform: None,
            class_names: Vec::new(),
        }
    }

    /// 设置样本维度.
    pub fn with_dim(mut self, dim: SampleDim) -> Self {
        self.dim = dim;
        self
    }

    /// 设置变换. 图像与标签都会经过该变换.
    pub fn with_transform(mut self, t: VolTransform) -> Self {
        self.transform = Some(t);
        self
    }

    /// 设置类别.
    pub fn with_class_names(mut self, class_names: Vec<u32>) -> Self {
        self.class_names = class_names;
        self
    }
}

impl VolDataset for SmallVolDataset {
    type Item = (Vol, Vol);

    #[inline]
    fn len(&self) -> usize {
        self.images.len()
    }

    fn get(&self, idx: usize) -> Option<Self::Item> {
        let image = self.images.get(idx)?;
        let label = self.labels.get(idx)?.clone();
        let image = match self.dim {
            SampleDim::Vol3d => image.clone(),
            SampleDim::Slice2d(z) if z < image.dim().0 => three_channel(image.slice(s![z, .., ..])),
            SampleDim::Slice2d(_) => return None,
        };
        Some(match &self.transform {
            Some(t) => (t(image), t(label)),
            None => (image, label),
        })
    }
}

/// 包围盒样本的目标信息.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxTarget {
    /// 包围盒.
    pub boxes: BoundingVolume,

    /// 包围盒内的类别.
    pub labels: Vec<u32>,

    /// 样本下标.
    pub image_id: usize,

    /// 样本体素个数.
    pub box_volume: usize,
}

/// 在一个体数据上按包围盒采样的数据集. 样本为 `(patch, target)`.
///
/// 包围盒不严格位于体数据内部时, 得到形状为 `patch_size` 的全零 patch.
pub struct BoundingVolumeDataset {
    image: Vol,
    bvols: Vec<BoundingVolume>,
    labels: Vec<Vec<u32>>,
    patch_size: Idx3d,
    transform: Option<VolTransform>,
}

impl BoundingVolumeDataset {
    /// 构建.
    ///
    /// # 注意
    ///
    /// `bvols` 与 `labels` 长度必须一致, 否则程序 panic.
    pub fn new(
        image: Vol,
        bvols: Vec<BoundingVolume>,
        labels: Vec<Vec<u32>>,
        patch_size: Idx3d,
    ) -> Self {
        assert_eq!(bvols.len(), labels.len(), "包围盒与标签个数不一致");
        Self {
            image,
            bvols,
            labels,
            patch_size,
            transform: None,
        }
    }

    /// 设置变换.
    pub fn with_transform(mut self, t: VolTransform) -> Self {
        self.transform = Some(t);
        self
    }
}

impl VolDataset for BoundingVolumeDataset {
    type Item = (Vol, BoxTarget);

    #[inline]
    fn len(&self) -> usize {
        self.bvols.len()
    }

    fn get(&self, idx: usize) -> Option<Self::Item> {
        let bvol = self.bvols.get(idx)?;
        let mut image = sample_bounding_volume(self.image.view(), bvol, self.patch_size);
        if let Some(t) = &self.transform {
            image = t(image);
        }
        let target = BoxTarget {
            boxes: *bvol,
            labels: self.labels[idx].clone(),
            image_id: idx,
            box_volume: image.len(),
        };
        Some((image, target))
    }
}

/// 在多个滤波后的体数据上按同一包围盒采样的数据集. 样本为 `(patches, target)`.
pub struct FilteredVolumeDataset {
    images: Vec<Vol>,
    bvols: Vec<BoundingVolume>,
    labels: Vec<Vec<u32>>,
    patch_size: Idx3d,
    transform: Option<VolTransform>,
}

impl FilteredVolumeDataset {
    /// 构建.
    ///
    /// # 注意
    ///
    /// `bvols` 与 `labels` 长度必须一致, 否则程序 panic.
    pub fn new(
        images: Vec<Vol>,
        bvols: Vec<BoundingVolume>,
        labels: Vec<Vec<u32>>,
        patch_size: Idx3d,
    ) -> Self {
        assert_eq!(bvols.len(), labels.len(), "包围盒与标签个数不一致");
        log::debug!("FilteredVolumeDataset patch size: {patch_size:?}");
        Self {
            images,
            bvols,
            labels,
            patch_size,
            transform: None,
        }
    }

    /// 设置变换. 每个滤波结果都会经过该变换.
    pub fn with_transform(mut self, t: VolTransform) -> Self {
        self.transform = Some(t);
        self
    }
}

impl VolDataset for FilteredVolumeDataset {
    type Item = (Vec<Vol>, BoxTarget);

    #[inline]
    fn len(&self) -> usize {
        self.bvols.len()
    }

    fn get(&self, idx: usize) -> Option<Self::Item> {
        let bvol = self.bvols.get(idx)?;
        let samples: Vec<Vol> = self
            .images
            .iter()
            .map(|v| {
                let p = sample_bounding_volume(v.view(), bvol, self.patch_size);
                match &self.transform {
                    Some(t) => t(p),
                    None => p,
                }
            })
            .collect();
        let box_volume = samples.last().map_or(0, |s| s.len());
        let target = BoxTarget {
            boxes: *bvol,
            labels: self.labels[idx].clone(),
            image_id: idx,
            box_volume,
        };
        Some((samples, target))
    }
}

/// 以第一个轴为样本轴的二维切片数据集. 样本为 `(image, label)`.
///
/// `threechan` 为真时, 图像为 `(3, h, w)`; 否则为 `(1, h, w)`.
#[derive(Debug, Clone)]
pub struct LabeledVolDataset {
    image: Array3<f32>,
    labels: Array3<f32>,
    threechan: bool,
}

impl LabeledVolDataset {
    /// 构建.
    ///
    /// # 注意
    ///
    /// `image` 与 `labels` 形状必须一致, 否则程序 panic.
    pub fn new(image: Array3<f32>, labels: Array3<f32>, threechan: bool) -> Self {
        assert_eq!(image.dim(), labels.dim(), "图像与标签形状不一致");
        Self {
            image,
            labels,
            threechan,
        }
    }
}

impl VolDataset for LabeledVolDataset {
    type Item = (Vol, Array2<f32>);

    #[inline]
    fn len(&self) -> usize {
        self.image.dim().0
    }

    fn get(&self, idx: usize) -> Option<Self::Item> {
        if idx >= self.len() {
            return None;
        }
        let image = self.image.slice(s![idx, .., ..]);
        let label = self.labels.slice(s![idx, .., ..]).to_owned();
        let image = if self.threechan {
            three_channel(image)
        } else {
            image.insert_axis(Axis(0)).to_owned()
        };
        Some((image, label))
    }
}

/// 按批次迭代数据集.
///
/// ```
/// use survos_core::entity::{DataLoader, SmallVolDataset};
/// use survos_core::volume::Vol;
///
/// let vols: Vec<Vol> = (0..5).map(|_| Vol::zeros((2, 2, 2))).collect();
/// let ds = SmallVolDataset::new(vols.clone(), vols);
/// let sizes: Vec<usize> = DataLoader::new(&ds, 2).map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![2, 2, 1]);
/// ```
pub struct DataLoader<'a, D: VolDataset> {
    dataset: &'a D,
    batch_size: usize,
    drop_last: bool,
    data_rev: Vec<usize>,
}

impl<'a, D: VolDataset> DataLoader<'a, D> {
    /// 按原顺序迭代.
    ///
    /// # 注意
    ///
    /// `batch_size` 为 0 时程序 panic.
    pub fn new(dataset: &'a D, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size 必须为正");
        let data_rev = (0..dataset.len()).rev().collect();
        Self {
            dataset,
            batch_size,
            drop_last: false,
            data_rev,
        }
    }

    /// 以 `rng` 打乱顺序.
    pub fn shuffle<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.data_rev.shuffle(rng);
        self
    }

    /// 丢弃最后一个不完整的批次.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl<'a, D: VolDataset> Iterator for DataLoader<'a, D> {
    type Item = Vec<D::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data_rev.is_empty() || (self.drop_last && self.data_rev.len() < self.batch_size) {
            return None;
        }
        let take = self.batch_size.min(self.data_rev.len());
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            let idx = self.data_rev.pop()?;
            batch.extend(self.dataset.get(idx));
        }
        Some(batch)
    }
}

impl<'a, D: VolDataset> ExactSizeIterator for DataLoader<'a, D> {
    fn len(&self) -> usize {
        let n = self.data_rev.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vols(n: usize) -> Vec<Vol> {
        (0..n).map(|i| Vol::from_elem((4, 3, 2), i as f32)).collect()
    }

    #[test]
    fn test_small_vol_dataset() {
        let ds = SmallVolDataset::new(vols(3), vols(3));
        assert_eq!(ds.len(), 3);
        let (img, lbl) = ds.get(2).unwrap();
        assert_eq!(img[[0, 0, 0]], 2.0);
        assert_eq!(lbl.dim(), (4, 3, 2));
        assert!(ds.get(3).is_none());

        let ds = SmallVolDataset::new(vols(2), vols(2))
            .with_dim(SampleDim::Slice2d(1))
            .with_transform(Box::new(|v: Vol| v * 2.0));
        let (img, lbl) = ds.get(1).unwrap();
        assert_eq!(img.dim(), (3, 3, 2));
        assert_eq!(img[[2, 0, 0]], 2.0);
        assert_eq!(lbl[[0, 0, 0]], 2.0);

        let ds = SmallVolDataset::new(vols(1), vols(1)).with_dim(SampleDim::Slice2d(9));
        assert!(ds.get(0).is_none());
    }

    #[test]
    fn test_bounding_volume_datasets() {
        let image = Vol::from_shape_fn((10, 10, 10), |(z, _, _)| z as f32);
        let bvols = vec![
            BoundingVolume::new(2, 2, 2, 6, 6, 6),
            BoundingVolume::new(0, 2, 2, 4, 6, 6),
        ];
        let labels = vec![vec![1], vec![2, 3]];
        let ds = BoundingVolumeDataset::new(image.clone(), bvols.clone(), labels.clone(), (4, 4, 4));
        let (p, t) = ds.get(0).unwrap();
        assert_eq!(p[[0, 0, 0]], 2.0);
        assert_eq!(t.box_volume, 64);
        let (p, t) = ds.get(1).unwrap();
        assert_eq!(p.sum(), 0.0);
        assert_eq!(t.labels, vec![2, 3]);
        assert_eq!(t.image_id, 1);

        let ds = FilteredVolumeDataset::new(vec![image.clone(), image * 10.0], bvols, labels, (4, 4, 4));
        let (ps, t) = ds.get(0).unwrap();
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[1][[1, 0, 0]], 30.0);
        assert_eq!(t.boxes, BoundingVolume::new(2, 2, 2, 6, 6, 6));
    }

    #[test]
    fn test_labeled_vol_dataset() {
        let image = Array3::from_shape_fn((3, 2, 2), |(i, _, _)| i as f32);
        let ds = LabeledVolDataset::new(image.clone(), image.clone(), true);
        let (img, lbl) = ds.get(2).unwrap();
        assert_eq!(img.dim(), (3, 2, 2));
        assert_eq!(lbl, Array2::from_elem((2, 2), 2.0));
        let ds = LabeledVolDataset::new(image.clone(), image, false);
        assert_eq!(ds.get(0).unwrap().0.dim(), (1, 2, 2));
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_data_loader() {
        let ds = SmallVolDataset::new(vols(5), vols(5));
        let loader = DataLoader::new(&ds, 2);
        assert_eq!(loader.len(), 3);
        let firsts: Vec<f32> = loader.map(|b| b[0].0[[0, 0, 0]]).collect();
        assert_eq!(firsts, vec![0.0, 2.0, 4.0]);

        let loader = DataLoader::new(&ds, 2).drop_last(true);
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.count(), 2);

        let mut rng = StdRng::seed_from_u64(42);
        let mut seen: Vec<f32> = DataLoader::new(&ds, 1)
            .shuffle(&mut rng)
            .flatten()
            .map(|(img, _)| img[[0, 0, 0]])
            .collect();
        seen.sort_by(f32::total_cmp);
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
