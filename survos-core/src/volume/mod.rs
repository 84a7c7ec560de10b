//! 三维体数据的基础操作: 填充, 裁剪, 翻转, 包围盒可视化, 连通域与形态学.

use crate::Idx3d;
use itertools::Itertools;
use ndarray::{s, Array3, ArrayView3, Axis};
use num::Zero;
use ordered_float::OrderedFloat;

mod bvol;
pub mod filter;
mod label;
pub mod morph;

pub use bvol::{BoundingVolume, RoiBox};
pub use label::largest_cc;

/// 浮点体数据 (图像图层).
pub type Vol = Array3<f32>;

/// 整数体数据 (标注图层).
pub type LabelVol = Array3<u32>;

/// 在三个方向上分别用 `padding[i]` 个零体素对称地填充体数据.
pub fn pad_vol<T: Clone + Zero>(vol: ArrayView3<T>, padding: [usize; 3]) -> Array3<T> {
    let (z, x, y) = vol.dim();
    let [pz, px, py] = padding;
    let mut padded = Array3::<T>::zeros((z + pz * 2, x + px * 2, y + py * 2));
    padded
        .slice_mut(s![pz..pz + z, px..px + x, py..py + y])
        .assign(&vol);
    padded
}

/// [`pad_vol`] 的逆操作: 去掉三个方向上各 `padding[i]` 个体素.
///
/// 如果 `vol` 某个方向不足 `2 * padding[i]`, 则程序 panic.
pub fn unpad_vol<T: Clone>(vol: ArrayView3<T>, padding: [usize; 3]) -> Array3<T> {
    let (z, x, y) = vol.dim();
    let [pz, px, py] = padding;
    assert!(
        z >= 2 * pz && x >= 2 * px && y >= 2 * py,
        "体数据小于填充大小"
    );
    vol.slice(s![pz..z - pz, px..x - px, py..y - py]).to_owned()
}

/// 按包围盒 `bvol` 裁剪体数据. 若包围盒不完全位于体数据内则返回 `None`.
pub fn sample_bvol<T: Clone>(vol: ArrayView3<T>, bvol: &BoundingVolume) -> Option<Array3<T>> {
    if !bvol.is_within(vol.dim()) {
        return None;
    }
    let [rz, rx, ry] = bvol.ranges();
    Some(vol.slice(s![rz, rx, ry]).to_owned())
}

/// 按包围盒 `bvol` 裁剪体数据.
///
/// 只有当包围盒 **严格** 位于体数据内部时才裁剪; 否则返回形状为
/// `patch_size` 的全零体数据.
pub fn sample_bounding_volume<T: Clone + Zero>(
    vol: ArrayView3<T>,
    bvol: &BoundingVolume,
    patch_size: Idx3d,
) -> Array3<T> {
    if bvol.is_strictly_within(vol.dim()) {
        let [rz, rx, ry] = bvol.ranges();
        vol.slice(s![rz, rx, ry]).to_owned()
    } else {
        Array3::zeros(patch_size)
    }
}

/// 创建形状为 `shape` 的全零体数据, 并将每个包围盒 (与体数据的交集) 填充为 1.
pub fn viz_bvols(shape: Idx3d, bvols: &[BoundingVolume]) -> Vol {
    let mut mask = Vol::zeros(shape);
    for b in bvols.iter().filter_map(|b| b.clip_to(shape)) {
        let [rz, rx, ry] = b.ranges();
        mask.slice_mut(s![rz, rx, ry]).fill(1.0);
    }
    mask
}

/// 沿第二个轴 (x) 翻转.
#[inline]
pub fn flip_lr<T: Clone>(vol: ArrayView3<T>) -> Array3<T> {
    vol.slice(s![.., ..;-1, ..]).to_owned()
}

/// 沿第一个轴 (z) 翻转.
#[inline]
pub fn flip_ud<T: Clone>(vol: ArrayView3<T>) -> Array3<T> {
    vol.slice(s![..;-1, .., ..]).to_owned()
}

/// 以 `vol >= thresh` 二值化, 结果为 0.0/1.0.
#[inline]
pub fn binarize(vol: ArrayView3<f32>, thresh: f32) -> Vol {
    vol.mapv(|v| if v >= thresh { 1.0 } else { 0.0 })
}

/// 以 `vol >= thresh` 二值化, 结果为标注体数据.
#[inline]
pub fn to_label_vol(vol: ArrayView3<f32>, thresh: f32) -> LabelVol {
    vol.mapv(|v| u32::from(v >= thresh))
}

/// 升序获取体数据中出现过的所有值 (去重).
pub fn unique_values(vol: ArrayView3<f32>) -> Vec<f32> {
    vol.iter()
        .map(|&v| OrderedFloat(v))
        .sorted_unstable()
        .dedup()
        .map(OrderedFloat::into_inner)
        .collect()
}

/// 升序获取标注体数据中出现过的所有标签 (去重).
pub fn unique_labels(vol: ArrayView3<u32>) -> Vec<u32> {
    vol.iter().copied().sorted_unstable().dedup().collect()
}

/// 沿第一个轴堆叠若干形状相同的体数据, 得到 4D 数组. 若 `vols` 为空则返回 `None`.
pub fn stack_vols(vols: &[Vol]) -> Option<ndarray::Array4<f32>> {
    let views: Vec<_> = vols.iter().map(|v| v.view()).collect();
    ndarray::stack(Axis(0), &views).ok()
}
