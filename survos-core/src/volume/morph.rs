//! 三维二值形态学操作.
//!
//! 所有操作都先以 `vol >= thresh` 将输入二值化为 0.0/1.0, 再重复 `num_iter` 次.
//! 结构元为 3x3x3 的 18-邻域 (与中心的曼哈顿距离不超过 2).

use super::filter::{for_each_slice_mut, median_filter};
use super::{binarize, Vol};
use crate::SurvosResult;
use itertools::iproduct;
use log::info;
use ndarray::ArrayView3;
use once_cell::sync::Lazy;

/// 18-邻域结构元 (含中心).
static STRUCT_18: Lazy<Vec<(i64, i64, i64)>> = Lazy::new(|| {
    iproduct!(-1i64..=1, -1i64..=1, -1i64..=1)
        .filter(|(a, b, c)| a.abs() + b.abs() + c.abs() <= 2)
        .collect()
});

/// 体数据外的体素视为 0.
#[inline]
fn at(vol: &ArrayView3<f32>, (z, x, y): (i64, i64, i64)) -> f32 {
    let (dz, dx, dy) = vol.dim();
    if z < 0 || x < 0 || y < 0 || z >= dz as i64 || x >= dx as i64 || y >= dy as i64 {
        0.0
    } else {
        vol[[z as usize, x as usize, y as usize]]
    }
}

/// 单次腐蚀/膨胀. `erode` 为真时要求结构元覆盖的所有体素为 1, 否则只要求存在一个.
fn step(vol: ArrayView3<f32>, erode: bool) -> Vol {
    let mut out = Vol::zeros(vol.dim());
    for_each_slice_mut(&mut out, |z, mut sli| {
        for ((x, y), o) in sli.indexed_iter_mut() {
            let mut hits = STRUCT_18
                .iter()
                .map(|&(a, b, c)| at(&vol, (z as i64 + a, x as i64 + b, y as i64 + c)) > 0.5);
            let on = if erode {
                hits.all(|h| h)
            } else {
                hits.any(|h| h)
            };
            *o = if on { 1.0 } else { 0.0 };
        }
    });
    out
}

/// 二值腐蚀.
pub fn erode(vol: ArrayView3<f32>, num_iter: usize, thresh: f32) -> Vol {
    info!("+ Computing erosion");
    let mut cur = binarize(vol, thresh);
    for _ in 0..num_iter {
        cur = step(cur.view(), true);
    }
    cur
}

/// 二值膨胀.
pub fn dilate(vol: ArrayView3<f32>, num_iter: usize, thresh: f32) -> Vol {
    info!("+ Computing dilation");
    let mut cur = binarize(vol, thresh);
    for _ in 0..num_iter {
        cur = step(cur.view(), false);
    }
    cur
}

/// 二值化后做 `num_iter` 次窗口大小为 `median_size` 的中值滤波.
pub fn median(
    vol: ArrayView3<f32>,
    median_size: usize,
    num_iter: usize,
    thresh: f32,
) -> SurvosResult<Vol> {
    info!("+ Computing median");
    let mut cur = binarize(vol, thresh);
    for _ in 0..num_iter {
        cur = median_filter(cur.view(), median_size)?;
    }
    Ok(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    #[test]
    fn test_struct_18() {
        assert_eq!(STRUCT_18.len(), 19);
        assert!(!STRUCT_18.contains(&(1, 1, 1)));
    }

    #[test]
    fn test_erode_cube() {
        let mut v = Array3::<f32>::zeros((7, 7, 7));
        v.slice_mut(s![1..6, 1..6, 1..6]).fill(1.0);
        let e = erode(v.view(), 1, 0.5);
        assert_eq!(e.sum(), 27.0);
        assert_eq!(e[[3, 3, 3]], 1.0);
        assert_eq!(e[[1, 1, 1]], 0.0);

        // 贴边的前景会被体数据外的 0 腐蚀掉.
        let full = Array3::<f32>::ones((3, 3, 3));
        let e = erode(full.view(), 1, 0.5);
        assert_eq!(e.sum(), 1.0);
    }

    #[test]
    fn test_dilate_point() {
        let mut v = Array3::<f32>::zeros((5, 5, 5));
        v[[2, 2, 2]] = 0.7;
        let d = dilate(v.view(), 1, 0.5);
        assert_eq!(d.sum(), 19.0);
        assert_eq!(d[[3, 3, 3]], 0.0);

        // 阈值之下的体素不参与膨胀.
        assert_eq!(dilate(v.view(), 1, 0.8).sum(), 0.0);
        // 0 次迭代只做二值化.
        assert_eq!(dilate(v.view(), 0, 0.5).sum(), 1.0);
    }

    #[test]
    fn test_median_binarizes() {
        let mut v = Array3::<f32>::zeros((4, 4, 4));
        v.slice_mut(s![.., .., 0..2]).fill(0.9);
        let m = median(v.view(), 3, 1, 0.5).unwrap();
        assert!(m.iter().all(|&p| p == 0.0 || p == 1.0));
        assert_eq!(m[[2, 2, 0]], 1.0);
        assert_eq!(m[[2, 2, 3]], 0.0);
    }
}
