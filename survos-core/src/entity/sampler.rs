//! 以实体点为中心采样 patch.

use super::EntityPoint;
use crate::volume::{sample_bvol, BoundingVolume};
use log::warn;
use ndarray::{Array3, ArrayView3};

/// 以每个点为中心构建大小为 `bvol_dim` 的包围盒. `flipxy` 为真时先交换 x 与 y.
pub fn centroid_to_bvol(
    centroids: &[EntityPoint],
    bvol_dim: [usize; 3],
    flipxy: bool,
) -> Vec<BoundingVolume> {
    centroids
        .iter()
        .map(|p| {
            let p = if flipxy { p.flip_xy() } else { *p };
            BoundingVolume::from_centroid(p.pos(), bvol_dim)
        })
        .collect()
}

/// [`sample_marked_patches`] 的结果. 三个字段一一对应.
#[derive(Debug, Clone, Default)]
pub struct MarkedPatches<T> {
    /// 采样得到的 patch.
    pub vols: Vec<Array3<T>>,

    /// 每个 patch 的包围盒.
    pub vols_bbs: Vec<BoundingVolume>,

    /// 每个 patch 的中心点 (含类别码).
    pub vols_locs: Vec<EntityPoint>,
}

impl<T> MarkedPatches<T> {
    /// patch 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.vols.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vols.is_empty()
    }

    /// 每个 patch 的类别码.
    pub fn labels(&self) -> Vec<u32> {
        self.vols_locs.iter().map(|p| p.class_code).collect()
    }
}

/// 以 `locs` 中每个点为中心, 从 `vol` 中采样大小为 `patch_size` 的 patch.
///
/// 包围盒超出体数据的点会被跳过并打印警告.
pub fn sample_marked_patches<T: Clone>(
    vol: ArrayView3<T>,
    locs: &[EntityPoint],
    patch_size: [usize; 3],
) -> MarkedPatches<T> {
    let mut out = MarkedPatches {
        vols: Vec::with_capacity(locs.len()),
        vols_bbs: Vec::with_capacity(locs.len()),
        vols_locs: Vec::with_capacity(locs.len()),
    };
    for p in locs {
        let bb = BoundingVolume::from_centroid(p.pos(), patch_size);
        match sample_bvol(vol, &bb) {
            Some(patch) => {
                out.vols.push(patch);
                out.vols_bbs.push(bb);
                out.vols_locs.push(*p);
            }
            None => warn!("skipping {p:?}: {bb:?} out of volume {:?}", vol.dim()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_to_bvol() {
        let pts = [EntityPoint::new(10.0, 20.0, 30.0, 2)];
        let b = centroid_to_bvol(&pts, [4, 6, 8], false);
        assert_eq!(b[0], BoundingVolume::new(8, 17, 26, 12, 23, 34));
        let b = centroid_to_bvol(&pts, [4, 4, 4], true);
        assert_eq!(b[0], BoundingVolume::new(8, 28, 18, 12, 32, 22));
    }

    #[test]
    fn test_sample_marked_patches() {
        let vol = Array3::from_shape_fn((10, 10, 10), |(z, x, y)| (z * 100 + x * 10 + y) as f32);
        let locs = [
            EntityPoint::new(5.0, 5.0, 5.0, 1),
            // 越界, 被跳过.
            EntityPoint::new(1.0, 5.0, 5.0, 2),
            EntityPoint::new(2.0, 2.0, 2.0, 3),
        ];
        let mp = sample_marked_patches(vol.view(), &locs, [4, 4, 4]);
        assert_eq!(mp.len(), 2);
        assert_eq!(mp.labels(), vec![1, 3]);
        assert_eq!(mp.vols[0].dim(), (4, 4, 4));
        assert_eq!(mp.vols[0][[0, 0, 0]], 333.0);
        assert_eq!(mp.vols_bbs[1], BoundingVolume::new(0, 0, 0, 4, 4, 4));
    }
}
