//! 简单的强度滤波器.

use super::Vol;
use crate::error::SurvosError;
use crate::SurvosResult;
use ndarray::{ArrayView3, ArrayViewMut2, Axis};

/// `reflect` 边界模式下的索引映射: `(d c b a | a b c d | d c b a)`.
#[inline]
pub(crate) fn reflect(i: i64, n: usize) -> usize {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let m = i.rem_euclid(2 * n);
    (if m >= n { 2 * n - 1 - m } else { m }) as usize
}

/// 对每个 z 切片调用 `op`. 启用 `rayon` 时并行执行.
pub(crate) fn for_each_slice_mut<F>(out: &mut Vol, op: F)
where
    F: Fn(usize, ArrayViewMut2<f32>) + Sync + Send,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(z, s)| op(z, s));
        } else {
            out.axis_iter_mut(Axis(0))
                .enumerate()
                .for_each(|(z, s)| op(z, s));
        }
    }
}

/// 反转: `1 - v`.
#[inline]
pub fn simple_invert(data: ArrayView3<f32>) -> Vol {
    data.mapv(|v| 1.0 - v)
}

/// 以边长为 `size` 的立方体窗口做中值滤波, 边界按 `reflect` 处理.
///
/// 窗口相对于中心体素的范围是 `[-size / 2, size - 1 - size / 2]`;
/// 偶数窗口取排序后第 `size^3 / 2` 个值.
pub fn median_filter(data: ArrayView3<f32>, size: usize) -> SurvosResult<Vol> {
    if size == 0 {
        return Err(SurvosError::invalid("中值滤波窗口大小必须为正"));
    }
    if size == 1 {
        return Ok(data.to_owned());
    }
    let (dz, dx, dy) = data.dim();
    let lo = -((size / 2) as i64);
    let hi = lo + size as i64;
    let rank = size.pow(3) / 2;

    let mut out = Vol::zeros((dz, dx, dy));
    for_each_slice_mut(&mut out, |z, mut sli| {
        let mut window = Vec::with_capacity(size.pow(3));
        for ((x, y), o) in sli.indexed_iter_mut() {
            window.clear();
            for oz in lo..hi {
                let zz = reflect(z as i64 + oz, dz);
                for ox in lo..hi {
                    let xx = reflect(x as i64 + ox, dx);
                    for oy in lo..hi {
                        window.push(data[[zz, xx, reflect(y as i64 + oy, dy)]]);
                    }
                }
            }
            let (_, m, _) = window.select_nth_unstable_by(rank, f32::total_cmp);
            *o = *m;
        }
    });
    Ok(out)
}

/// 伽马校正: `v^gamma`. 输入不允许存在负值.
pub fn gamma_correct(data: ArrayView3<f32>, gamma: f32) -> SurvosResult<Vol> {
    if gamma < 0.0 {
        return Err(SurvosError::invalid("gamma 必须非负"));
    }
    if data.iter().any(|&v| v < 0.0) {
        return Err(SurvosError::invalid("伽马校正的输入存在负值"));
    }
    Ok(data.mapv(|v| v.powf(gamma)))
}
