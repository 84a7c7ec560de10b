//! 包围盒 (bounding volume) 与 ROI.

use crate::Idx3d;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 三维包围盒, 按 `[z_st, x_st, y_st, z_end, x_end, y_end]` 组织, 左闭右开.
///
/// 坐标允许为负数或超出体数据范围, 因为实体可能位于体数据边缘附近.
/// 在真正裁剪之前, 调用方应使用 [`Self::is_within`] 检查.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BoundingVolume {
    /// z 方向起点.
    pub z_st: i64,
    /// x 方向起点.
    pub x_st: i64,
    /// y 方向起点.
    pub y_st: i64,
    /// z 方向终点 (不含).
    pub z_end: i64,
    /// x 方向终点 (不含).
    pub x_end: i64,
    /// y 方向终点 (不含).
    pub y_end: i64,
}

impl BoundingVolume {
    /// 由六个分量直接构建.
    #[inline]
    pub const fn new(z_st: i64, x_st: i64, y_st: i64, z_end: i64, x_end: i64, y_end: i64) -> Self {
        Self {
            z_st,
            x_st,
            y_st,
            z_end,
            x_end,
            y_end,
        }
    }

    /// 由 `[z_st, x_st, y_st, z_end, x_end, y_end]` 构建.
    #[inline]
    pub const fn from_array([z_st, x_st, y_st, z_end, x_end, y_end]: [i64; 6]) -> Self {
        Self::new(z_st, x_st, y_st, z_end, x_end, y_end)
    }

    /// 转换为 `[z_st, x_st, y_st, z_end, x_end, y_end]`.
    #[inline]
    pub const fn to_array(&self) -> [i64; 6] {
        [
            self.z_st, self.x_st, self.y_st, self.z_end, self.x_end, self.y_end,
        ]
    }

    /// 以 `centroid` (四舍五入到体素) 为中心构建大小为 `dims` 的包围盒.
    ///
    /// 起点为 `c - d / 2`, 终点为起点 + `d`, 因此包围盒的大小总是严格等于 `dims`.
    pub fn from_centroid((z, x, y): (f64, f64, f64), dims: [usize; 3]) -> Self {
        let st = |c: f64, d: usize| c.round() as i64 - (d / 2) as i64;
        let (z_st, x_st, y_st) = (st(z, dims[0]), st(x, dims[1]), st(y, dims[2]));
        Self::new(
            z_st,
            x_st,
            y_st,
            z_st + dims[0] as i64,
            x_st + dims[1] as i64,
            y_st + dims[2] as i64,
        )
    }

    /// 包围盒形状. 退化的维度记为 0.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        let len = |st: i64, end: i64| (end - st).max(0) as usize;
        (
            len(self.z_st, self.z_end),
            len(self.x_st, self.x_end),
            len(self.y_st, self.y_end),
        )
    }

    /// 包围盒包含的体素个数.
    #[inline]
    pub fn volume(&self) -> usize {
        let (z, x, y) = self.shape();
        z * x * y
    }

    /// 包围盒中心 (浮点).
    #[inline]
    pub fn centroid(&self) -> (f64, f64, f64) {
        let mid = |st: i64, end: i64| (st + end) as f64 / 2.0;
        (
            mid(self.z_st, self.z_end),
            mid(self.x_st, self.x_end),
            mid(self.y_st, self.y_end),
        )
    }

    /// 点 `(z, x, y)` 是否位于包围盒内.
    pub fn contains_point(&self, (z, x, y): (f64, f64, f64)) -> bool {
        let inside = |c: f64, st: i64, end: i64| st as f64 <= c && c < end as f64;
        inside(z, self.z_st, self.z_end)
            && inside(x, self.x_st, self.x_end)
            && inside(y, self.y_st, self.y_end)
    }

    /// 包围盒是否完全位于形状为 `shape` 的体数据内部 (允许贴边).
    pub fn is_within(&self, (z, x, y): Idx3d) -> bool {
        self.z_st >= 0
            && self.x_st >= 0
            && self.y_st >= 0
            && self.z_end <= z as i64
            && self.x_end <= x as i64
            && self.y_end <= y as i64
            && self.volume() > 0
    }

    /// 包围盒是否严格位于体数据内部 (所有起点大于 0, 所有终点小于对应维度).
    pub fn is_strictly_within(&self, (z, x, y): Idx3d) -> bool {
        self.z_st > 0
            && self.x_st > 0
            && self.y_st > 0
            && self.z_end < z as i64
            && self.x_end < x as i64
            && self.y_end < y as i64
    }

    /// 三个方向上的索引区间.
    ///
    /// 调用方必须保证 [`Self::is_within`] 为真, 否则程序 panic.
    pub fn ranges(&self) -> [Range<usize>; 3] {
        assert!(self.z_st >= 0 && self.x_st >= 0 && self.y_st >= 0, "包围盒起点为负");
        [
            self.z_st as usize..self.z_end as usize,
            self.x_st as usize..self.x_end as usize,
            self.y_st as usize..self.y_end as usize,
        ]
    }

    /// 与形状为 `shape` 的体数据求交. 若交集为空则返回 `None`.
    pub fn clip_to(&self, (z, x, y): Idx3d) -> Option<Self> {
        let clipped = Self::new(
            self.z_st.max(0),
            self.x_st.max(0),
            self.y_st.max(0),
            self.z_end.min(z as i64),
            self.x_end.min(x as i64),
            self.y_end.min(y as i64),
        );
        (clipped.volume() > 0).then_some(clipped)
    }
}

/// ROI 区域, 按 `[z0, z1, x0, x1, y0, y1]` 组织 (配置文件中 `roi_crop` 的格式).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "[usize; 6]", into = "[usize; 6]")]
pub struct RoiBox {
    /// z 区间.
    pub z: (usize, usize),
    /// x 区间.
    pub x: (usize, usize),
    /// y 区间.
    pub y: (usize, usize),
}

impl From<[usize; 6]> for RoiBox {
    fn from([z0, z1, x0, x1, y0, y1]: [usize; 6]) -> Self {
        Self {
            z: (z0, z1),
            x: (x0, x1),
            y: (y0, y1),
        }
    }
}

impl From<RoiBox> for [usize; 6] {
    fn from(r: RoiBox) -> Self {
        [r.z.0, r.z.1, r.x.0, r.x.1, r.y.0, r.y.1]
    }
}

impl RoiBox {
    /// 转换为等价的包围盒.
    #[inline]
    pub fn to_bvol(&self) -> BoundingVolume {
        BoundingVolume::new(
            self.z.0 as i64,
            self.x.0 as i64,
            self.y.0 as i64,
            self.z.1 as i64,
            self.x.1 as i64,
            self.y.1 as i64,
        )
    }

    /// ROI 起点.
    #[inline]
    pub fn origin(&self) -> Idx3d {
        (self.z.0, self.x.0, self.y.0)
    }

    /// 以 `z0_z1_x0_x1_y0_y1` 的形式命名该 ROI.
    pub fn name(&self) -> String {
        <[usize; 6]>::from(*self).map(|v| v.to_string()).join("_")
    }
}
