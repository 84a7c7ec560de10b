//! 实体点集的基础操作.

use super::meta::EntityMetaMap;
use crate::volume::{sample_bvol, RoiBox};
use crate::Idx3d;
use log::debug;
use ndarray::{Array3, ArrayView3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 一个带类别码的实体点. 坐标按 `(z, x, y)` 组织.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPoint {
    /// z 坐标.
    pub z: f64,
    /// x 坐标.
    pub x: f64,
    /// y 坐标.
    pub y: f64,
    /// 类别码.
    pub class_code: u32,
}

impl EntityPoint {
    /// 构建.
    #[inline]
    pub const fn new(z: f64, x: f64, y: f64, class_code: u32) -> Self {
        Self { z, x, y, class_code }
    }

    /// 坐标部分.
    #[inline]
    pub const fn pos(&self) -> (f64, f64, f64) {
        (self.z, self.x, self.y)
    }

    /// 四舍五入到体素索引. 若任一分量为负则返回 `None`.
    pub fn voxel(&self) -> Option<Idx3d> {
        let r = |v: f64| {
            let v = v.round();
            (v >= 0.0).then_some(v as usize)
        };
        Some((r(self.z)?, r(self.x)?, r(self.y)?))
    }

    /// 交换 x 与 y.
    #[inline]
    pub const fn flip_xy(&self) -> Self {
        Self::new(self.z, self.y, self.x, self.class_code)
    }

    /// 平移.
    #[inline]
    pub fn shifted(&self, (dz, dx, dy): (f64, f64, f64)) -> Self {
        Self::new(self.z + dz, self.x + dx, self.y + dy, self.class_code)
    }
}

impl From<[f64; 4]> for EntityPoint {
    /// `[z, x, y, class_code]`. 类别码向下取整.
    fn from([z, x, y, c]: [f64; 4]) -> Self {
        Self::new(z, x, y, c.max(0.0) as u32)
    }
}

impl From<EntityPoint> for [f64; 4] {
    fn from(p: EntityPoint) -> Self {
        [p.z, p.x, p.y, p.class_code as f64]
    }
}

/// 将所有点平移 `offset`.
///
/// `random_offset` 为真时, 每个点的每个分量额外加上 `[-scale / 2, scale / 2)`
/// 内均匀分布的随机偏移, 并四舍五入到整体素.
pub fn offset_points<R: Rng + ?Sized>(
    pts: &[EntityPoint],
    offset: [f64; 3],
    scale: f64,
    random_offset: bool,
    rng: &mut R,
) -> Vec<EntityPoint> {
    let half = scale / 2.0;
    let mut jitter = || {
        if random_offset && half > 0.0 {
            rng.gen_range(-half..half).round()
        } else {
            0.0
        }
    };
    pts.iter()
        .map(|p| {
            let d = (offset[0] + jitter(), offset[1] + jitter(), offset[2] + jitter());
            p.shifted(d)
        })
        .collect()
}

/// 按缩放 `scale` 与偏移 `offset` 变换所有点: `p * scale + offset`.
pub fn scale_and_offset(pts: &[EntityPoint], scale: [f64; 3], offset: [f64; 3]) -> Vec<EntityPoint> {
    pts.iter()
        .map(|p| {
            EntityPoint::new(
                p.z * scale[0] + offset[0],
                p.x * scale[1] + offset[1],
                p.y * scale[2] + offset[2],
                p.class_code,
            )
        })
        .collect()
}

/// 按 ROI 裁剪体数据, 并只保留落在 ROI 内的点.
///
/// `offset` 为真时, 保留下来的点会平移到 ROI 原点坐标系.
/// 若 ROI 超出体数据范围, 则返回 `None`.
pub fn crop_vol_and_pts_bb<T: Clone>(
    vol: ArrayView3<T>,
    pts: &[EntityPoint],
    roi: &RoiBox,
    offset: bool,
) -> Option<(Array3<T>, Vec<EntityPoint>)> {
    let bvol = roi.to_bvol();
    let cropped = sample_bvol(vol, &bvol)?;
    let (oz, ox, oy) = roi.origin();
    let origin = (-(oz as f64), -(ox as f64), -(oy as f64));
    let kept: Vec<_> = pts
        .iter()
        .filter(|p| bvol.contains_point(p.pos()))
        .map(|p| if offset { p.shifted(origin) } else { *p })
        .collect();
    debug!(
        "cropped volume to {:?}, kept {} of {} points",
        cropped.dim(),
        kept.len(),
        pts.len()
    );
    Some((cropped, kept))
}

/// 按 `meta` 中类别的顺序整理实体点.
///
/// 每个类别的点会存入对应的 `meta[class].entities`. 返回所有类别的点按顺序拼接的结果.
/// 类别码不在 `meta` 中的点会被丢弃. `flipxy` 为真时交换每个点的 x 与 y.
pub fn organize_entities(
    pts: &[EntityPoint],
    meta: &mut EntityMetaMap,
    flipxy: bool,
) -> Vec<EntityPoint> {
    let mut combined = Vec::with_capacity(pts.len());
    for (code, m) in meta.iter_mut() {
        let Ok(c) = code.parse::<u32>() else {
            m.entities.clear();
            continue;
        };
        m.entities = pts
            .iter()
            .filter(|p| p.class_code == c)
            .map(|p| if flipxy { p.flip_xy() } else { *p })
            .collect();
        debug!("class `{}` ({}): {} entities", code, m.name, m.entities.len());
        combined.extend_from_slice(&m.entities);
    }
    combined
}

/// 在形状为 `shape` 的体数据中均匀生成 `n` 个整数坐标的随机点. 类别码为 0.
///
/// # 注意
///
/// 如果 `shape` 任一分量为 0, 则程序 panic.
pub fn generate_random_points_in_volume<R: Rng + ?Sized>(
    (dz, dx, dy): Idx3d,
    n: usize,
    rng: &mut R,
) -> Vec<EntityPoint> {
    assert!(dz > 0 && dx > 0 && dy > 0, "体数据为空");
    (0..n)
        .map(|_| {
            EntityPoint::new(
                rng.gen_range(0..dz) as f64,
                rng.gen_range(0..dx) as f64,
                rng.gen_range(0..dy) as f64,
                0,
            )
        })
        .collect()
}

/// 去除位于掩膜前景 (`> 0`) 或者掩膜范围外的点.
pub fn remove_masked_entities<T>(mask: ArrayView3<T>, pts: &[EntityPoint]) -> Vec<EntityPoint>
where
    T: Copy + PartialOrd + num::Zero,
{
    let (dz, dx, dy) = mask.dim();
    pts.iter()
        .filter(|p| match p.voxel() {
            Some((z, x, y)) if z < dz && x < dx && y < dy => !(mask[[z, x, y]] > T::zero()),
            _ => false,
        })
        .copied()
        .collect()
}
