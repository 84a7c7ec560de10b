//! 三维连通域.

use crate::Idx3d;
use ndarray::{Array3, ArrayView3};
use num::{One, Zero};
use std::collections::VecDeque;

/// 获取 `pos` 前后上下左右六个点的坐标. 越界坐标会被过滤掉.
#[inline]
pub(crate) fn diamond_neighbours((z, x, y): Idx3d, (dz, dx, dy): Idx3d) -> Vec<Idx3d> {
    [
        (z.wrapping_sub(1), x, y),
        (z.saturating_add(1), x, y),
        (z, x.wrapping_sub(1), y),
        (z, x.saturating_add(1), y),
        (z, x, y.wrapping_sub(1)),
        (z, x, y.saturating_add(1)),
    ]
    .into_iter()
    .filter(|&(a, b, c)| a < dz && b < dx && c < dy)
    .collect()
}

/// 按 6-邻域 (钻石型) 标记 `vol > 0` 的所有连通域.
///
/// 返回值的第一个分量为标签体数据 (背景为 0, 连通域从 1 开始按行优先序编号),
/// 第二个分量为连通域个数.
pub fn label_components<T>(vol: ArrayView3<T>) -> (Array3<u32>, u32)
where
    T: Copy + Zero + PartialOrd,
{
    let shape = vol.dim();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut next = 0u32;
    let mut bfs_q = VecDeque::with_capacity(64);

    for (pos, &v) in vol.indexed_iter() {
        if !(v > T::zero()) || labels[pos] != 0 {
            continue;
        }
        next += 1;
        labels[pos] = next;
        bfs_q.push_back(pos);
        while let Some(cur) = bfs_q.pop_front() {
            for neigh in diamond_neighbours(cur, shape) {
                if labels[neigh] == 0 && vol[neigh] > T::zero() {
                    labels[neigh] = next;
                    bfs_q.push_back(neigh);
                }
            }
        }
    }
    (labels, next)
}

/// 保留最大的连通域.
///
/// 连通域按 6-邻域从 `vol > 0` 中提取, 其 "大小" 是域内体素值之和.
/// 所有大小等于最大值的连通域都会被置为 1, 其余体素置为 0.
/// 如果不存在前景, 则返回全零体数据.
pub fn largest_cc<T>(vol: ArrayView3<T>) -> Array3<T>
where
    T: Copy + Zero + One + PartialOrd + Into<f64>,
{
    let (labels, n) = label_components(vol);
    if n == 0 {
        return Array3::zeros(vol.dim());
    }

    let mut sizes = vec![0.0f64; n as usize + 1];
    for (&l, &v) in labels.iter().zip(vol.iter()) {
        if l != 0 {
            sizes[l as usize] += v.into();
        }
    }
    let max_sz = sizes[1..].iter().copied().fold(f64::MIN, f64::max);

    labels.mapv(|l| {
        if l != 0 && sizes[l as usize] == max_sz {
            T::one()
        } else {
            T::zero()
        }
    })
}
