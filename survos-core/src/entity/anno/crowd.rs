//! 众包点击标注的整理与可视化.
//!
//! 众包平台导出的会话数据以 Python 元组字面量的形式记录 ROI 与点击坐标,
//! 例如 `(75, 100, 200, 300, 400)` 与 `(12, 'roi', [(1.5, 2.0), (3, 4)])`.
//! 本模块解析这些字面量, 将点击坐标转换为体数据坐标, 并围绕点击位置截取图像.

use crate::error::SurvosError;
use crate::volume::Vol;
use crate::SurvosResult;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, GrayImage, ImageResult, Luma, Rgba, RgbaImage};
use log::{debug, warn};
use ndarray::{concatenate, s, Array2, ArrayView2, ArrayView3, Axis};
use std::fmt;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// 元组字面量中的值.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// 整数.
    Int(i64),
    /// 浮点数.
    Float(f64),
    /// 字符串.
    Str(String),
    /// 布尔值.
    Bool(bool),
    /// `None`.
    None,
    /// 元组.
    Tuple(Vec<Literal>),
    /// 列表.
    List(Vec<Literal>),
}

impl Literal {
    /// 数值. 整数会被转换为浮点数.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    /// 字符串.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 元组或列表的元素.
    pub fn as_seq(&self) -> Option<&[Literal]> {
        match self {
            Self::Tuple(v) | Self::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, v: &[Literal]| -> fmt::Result {
            for (i, e) in v.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{e}")?;
            }
            Ok(())
        };
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::None => f.write_str("None"),
            Self::Tuple(v) => {
                f.write_str("(")?;
                join(f, v)?;
                if v.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::List(v) => {
                f.write_str("[")?;
                join(f, v)?;
                f.write_str("]")
            }
        }
    }
}

struct LiteralParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn err<T>(&self, msg: impl Into<String>) -> SurvosResult<T> {
        Err(SurvosError::Parse(self.pos, msg.into()))
    }

    fn skip_ws(&mut self) {
        while self.src.get(self.pos).map_or(false, u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn value(&mut self) -> SurvosResult<Literal> {
        match self.peek() {
            Some(b'(') => self.seq(b')').map(|(v, trailing_comma)| {
                // `(x)` 只是带括号的值.
                if v.len() == 1 && !trailing_comma {
                    v.into_iter().next().unwrap_or(Literal::None)
                } else {
                    Literal::Tuple(v)
                }
            }),
            Some(b'[') => self.seq(b']').map(|(v, _)| Literal::List(v)),
            Some(q @ (b'\'' | b'"')) => self.string(q),
            Some(c) if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.ident(),
            Some(c) => self.err(format!("意外的字符 `{}`", c as char)),
            None => self.err("意外的结尾"),
        }
    }

    /// 解析以 `close` 结尾的序列. 返回元素以及最后是否有多余的逗号.
    fn seq(&mut self, close: u8) -> SurvosResult<(Vec<Literal>, bool)> {
        self.pos += 1;
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = false;
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => {}
                Some(c) => return self.err(format!("期望 `,` 或 `{}`, 发现 `{}`", close as char, c as char)),
                None => return self.err("序列没有闭合"),
            }
        }
    }

    fn string(&mut self, quote: u8) -> SurvosResult<Literal> {
        self.pos += 1;
        let start = self.pos;
        while let Some(&c) = self.src.get(self.pos) {
            if c == quote {
                let s = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(Literal::Str(s));
            }
            self.pos += 1;
        }
        self.err("字符串没有闭合")
    }

    fn number(&mut self) -> SurvosResult<Literal> {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .map_or(false, |c| c.is_ascii_alphanumeric() || b"+-.".contains(c))
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Literal::Int(i));
        }
        match text.parse::<f64>() {
            Ok(f) => Ok(Literal::Float(f)),
            Err(_) => Err(SurvosError::Parse(start, format!("非法数字 `{text}`"))),
        }
    }

    fn ident(&mut self) -> SurvosResult<Literal> {
        let start = self.pos;
        while self.src.get(self.pos).map_or(false, u8::is_ascii_alphanumeric) {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"True" => Ok(Literal::Bool(true)),
            b"False" => Ok(Literal::Bool(false)),
            b"None" => Ok(Literal::None),
            other => Err(SurvosError::Parse(
                start,
                format!("未知标识符 `{}`", String::from_utf8_lossy(other)),
            )),
        }
    }
}

/// 解析一个 Python 字面量 (数字, 字符串, 布尔值, `None`, 元组, 列表).
pub fn parse_literal(s: &str) -> SurvosResult<Literal> {
    let mut p = LiteralParser {
        src: s.as_bytes(),
        pos: 0,
    };
    let v = p.value()?;
    match p.peek() {
        None => Ok(v),
        Some(c) => p.err(format!("多余的字符 `{}`", c as char)),
    }
}

/// 解析一个元组字面量. 如果字面量不是元组则返回 `Err`.
pub fn parse_tuple(s: &str) -> SurvosResult<Vec<Literal>> {
    match parse_literal(s)? {
        Literal::Tuple(v) => Ok(v),
        other => Err(SurvosError::Parse(0, format!("期望元组, 发现 `{other}`"))),
    }
}

fn numbers<const N: usize>(v: &[Literal]) -> Option<[f64; N]> {
    if v.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (o, l) in out.iter_mut().zip(v) {
        *o = l.as_f64()?;
    }
    Some(out)
}

/// 一次点击, 按 `(slice, x, y)` 组织.
///
/// 截取窗口时 `y` 对应体数据的第 1 轴, `x` 对应第 2 轴.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    /// z 切片.
    pub slice: f64,
    /// x 坐标.
    pub x: f64,
    /// y 坐标.
    pub y: f64,
}

impl Click {
    /// 构建.
    #[inline]
    pub const fn new(slice: f64, x: f64, y: f64) -> Self {
        Self { slice, x, y }
    }
}

/// 一条会话记录. 两个字段都是元组字面量.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    /// `(sliceno, xstart, ystart, xend, yend)`.
    pub parent_data_roi: String,

    /// `(classification_id, roi, [(x, y), ...])`.
    pub roi_coord_tuples: String,
}

/// [`extract_session_roi`] 的结果.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionExtract {
    /// 所有会话的点击 (体数据坐标).
    pub clicks: Vec<Click>,

    /// 每个会话的 `(classification_id, roi)`.
    pub sessions: Vec<(Literal, String)>,
}

fn check_range(range: &Range<usize>, len: usize) -> SurvosResult<()> {
    if range.start > range.end || range.end > len {
        return Err(SurvosError::invalid(format!(
            "区间 {range:?} 超出记录范围 0..{len}"
        )));
    }
    Ok(())
}

/// 从 `rows[range]` 中提取点击.
///
/// 点击坐标相对于 ROI 起点 `(xstart, ystart)`, 提取后平移到体数据坐标.
pub fn extract_session_roi(rows: &[SessionRow], range: Range<usize>) -> SurvosResult<SessionExtract> {
    check_range(&range, rows.len())?;
    let mut out = SessionExtract::default();
    for idx in range {
        if idx % 500 == 0 {
            debug!("Extracting roi for parent_data_roi index: {idx}");
        }
        let row = &rows[idx];
        let roi = parse_tuple(&row.parent_data_roi)?;
        let [sliceno, xstart, ystart, _xend, _yend] = numbers::<5>(&roi).ok_or_else(|| {
            SurvosError::Parse(0, format!("非法 ROI `{}`", row.parent_data_roi))
        })?;

        let session = parse_tuple(&row.roi_coord_tuples)?;
        let [classification_id, roi_str, clicks_list] = <[Literal; 3]>::try_from(session)
            .map_err(|_| SurvosError::Parse(0, format!("非法会话 `{}`", row.roi_coord_tuples)))?;
        let roi_str = match roi_str {
            Literal::Str(s) => s,
            other => other.to_string(),
        };
        out.sessions.push((classification_id, roi_str));

        let clicks = clicks_list.as_seq().unwrap_or_default();
        for c in clicks {
            let [x, y] = c
                .as_seq()
                .and_then(|v| numbers::<2>(&v[..v.len().min(2)]))
                .ok_or_else(|| SurvosError::Parse(0, format!("非法点击 `{c}`")))?;
            out.clicks.push(Click::new(sliceno, xstart + x, ystart + y));
        }
    }
    Ok(out)
}

/// 从 `zoon_list[range]` 中提取点击.
///
/// 每条记录为 `(sliceno, xstart, ystart, xend, yend, x, y)`, 其中 `(x, y)` 相对于 ROI 起点.
pub fn extract_session_roi2(zoon_list: &[[f64; 7]], range: Range<usize>) -> SurvosResult<Vec<Click>> {
    check_range(&range, zoon_list.len())?;
    Ok(zoon_list[range]
        .iter()
        .map(|&[sliceno, xstart, ystart, _, _, x, y]| Click::new(sliceno, xstart + x, ystart + y))
        .collect())
}

/// [`generate_clicklist`] 的结果.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickList {
    /// 切片位于 `[slice_start, slice_end]` 的点击.
    pub selected: Vec<Click>,
    /// 所有点击的 x 跨度.
    pub x_range: f64,
    /// 所有点击的 y 跨度.
    pub y_range: f64,
}

/// 选出切片位于 `[slice_start, slice_end]` 的点击, 同时统计所有点击的坐标跨度.
pub fn generate_clicklist(clicks: &[Click], slice_start: f64, slice_end: f64) -> ClickList {
    let span = |f: fn(&Click) -> f64| {
        let (lo, hi) = clicks
            .iter()
            .map(f)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if clicks.is_empty() {
            0.0
        } else {
            hi - lo
        }
    };
    ClickList {
        selected: clicks
            .iter()
            .filter(|c| c.slice >= slice_start && c.slice <= slice_end)
            .copied()
            .collect(),
        x_range: span(|c| c.x),
        y_range: span(|c| c.y),
    }
}

/// 截取第 `slice` 层中 `[xstart, xend) * [ystart, yend)` 的窗口. 越界时返回 `None`.
pub fn get_window(
    vol: ArrayView3<f32>,
    slice: usize,
    xstart: usize,
    ystart: usize,
    xend: usize,
    yend: usize,
) -> Option<Array2<f32>> {
    let (dz, dx, dy) = vol.dim();
    if slice >= dz || xstart >= xend || ystart >= yend || xend > dx || yend > dy {
        return None;
    }
    Some(vol.slice(s![slice, xstart..xend, ystart..yend]).to_owned())
}

/// 截取第 `slice` 层中以 `(x, y)` 为中心, 大小为 `(2w, 2h)` 的窗口. 越界时返回 `None`.
pub fn get_img_in_bbox(
    vol: ArrayView3<f32>,
    slice: i64,
    x: i64,
    y: i64,
    w: usize,
    h: usize,
) -> Option<Array2<f32>> {
    let (w, h) = (w as i64, h as i64);
    if slice < 0 || x - w < 0 || y - h < 0 {
        return None;
    }
    get_window(
        vol,
        slice as usize,
        (x - w) as usize,
        (y - h) as usize,
        (x + w) as usize,
        (y + h) as usize,
    )
}

/// [`click_patches`] 的结果. 三个字段一一对应.
#[derive(Debug, Clone, Default)]
pub struct ClickPatches {
    /// 截取的图像.
    pub imgs: Vec<Array2<f32>>,
    /// 标题, 形如 `{y}_{x}_{slice}`.
    pub titles: Vec<String>,
    /// `(slice, y, x, w, h)`, 与窗口的轴顺序一致.
    pub coords: Vec<(f64, f64, f64, usize, usize)>,
}

/// 点击记录的第三个分量对应体数据的第 1 轴.
fn click_image(vol: ArrayView3<f32>, c: &Click, (w, h): (usize, usize)) -> Option<Array2<f32>> {
    get_img_in_bbox(
        vol,
        c.slice as i64,
        c.y.ceil() as i64,
        c.x.ceil() as i64,
        w,
        h,
    )
}

/// 围绕每个点击截取大小为 `(2w, 2h)` 的图像. 越界的点击会被跳过.
pub fn click_patches(vol: ArrayView3<f32>, clicks: &[Click], patch_size: (usize, usize)) -> ClickPatches {
    let mut out = ClickPatches::default();
    for c in clicks {
        let Some(img) = click_image(vol, c, patch_size) else {
            warn!("click {c:?} out of volume {:?}", vol.dim());
            continue;
        };
        out.imgs.push(img);
        out.titles
            .push(format!("{}_{}_{}", c.y as i64, c.x as i64, c.slice as i64));
        out.coords.push((c.slice, c.y, c.x, patch_size.0, patch_size.1));
    }
    out
}

/// 同 [`click_patches`], 但只处理切片位于开区间 `(bv.0, bv.1)` 内的点击.
pub fn click_patches_cropped(
    vol: ArrayView3<f32>,
    clicks: &[Click],
    bv: (f64, f64),
    patch_size: (usize, usize),
) -> ClickPatches {
    let inside: Vec<Click> = clicks
        .iter()
        .filter(|c| c.slice > bv.0 && c.slice < bv.1)
        .copied()
        .collect();
    click_patches(vol, &inside, patch_size)
}

/// 分屏动画的标题, 形如 `loc_{slice}_{y}_{x}_size_{d}_{w}_{h}`.
pub fn movie_title(click: &Click, (d, w, h): (usize, usize, usize)) -> String {
    format!(
        "loc_{}_{}_{}_size_{d}_{w}_{h}",
        click.slice as i64, click.y as i64, click.x as i64
    )
}

/// 生成分屏动画的帧.
///
/// 从 `slice - d / 2` 开始的连续 `d` 层中, 分别截取两个体数据在点击处大小为
/// `(2w, 2h)` 的窗口, 左右拼接为一帧.
///
/// # 返回值
///
/// 两个体数据形状不一致, 或者某一帧越界时返回 `Err`.
pub fn splitscreen_frames(
    vol_a: ArrayView3<f32>,
    vol_b: ArrayView3<f32>,
    click: &Click,
    movie_size: (usize, usize, usize),
) -> SurvosResult<Vec<Array2<f32>>> {
    if vol_a.dim() != vol_b.dim() {
        return Err(SurvosError::ShapeMismatch(vol_a.dim(), vol_b.dim()));
    }
    let (d, w, h) = movie_size;
    let slice_start = click.slice as i64 - (d / 2) as i64;
    let (a1, a2) = (click.y.ceil() as i64, click.x.ceil() as i64);
    debug!("Writing movie from slice {} to {}", slice_start, slice_start + d as i64);

    (0..d as i64)
        .map(|k| {
            let left = get_img_in_bbox(vol_a, slice_start + k, a1, a2, w, h);
            let right = get_img_in_bbox(vol_b, slice_start + k, a1, a2, w, h);
            let (Some(l), Some(r)) = (left, right) else {
                return Err(SurvosError::invalid(format!(
                    "第 {} 层的窗口超出体数据范围 {:?}",
                    slice_start + k,
                    vol_a.dim()
                )));
            };
            concatenate(Axis(1), &[l.view(), r.view()])
                .map_err(|e| SurvosError::invalid(e.to_string()))
        })
        .collect()
}

/// 线性拉伸到 `[0, 255]`. 常数图像映射为 0.
fn to_gray(img: ArrayView2<f32>) -> GrayImage {
    let (lo, hi) = img
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = if hi > lo { 255.0 / (hi - lo) } else { 0.0 };
    let (height, width) = img.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((r, c), &v) in img.indexed_iter() {
        buf.put_pixel(c as u32, r as u32, Luma([((v - lo) * scale).round() as u8]));
    }
    buf
}

/// 表明一个可以保存为灰度图像的二维帧.
///
/// 像素值会被线性拉伸到 `[0, 255]`.
pub trait FrameWrite {
    /// 保存到 `path`. 图像格式由扩展名决定.
    fn save_frame<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

macro_rules! impl_frame_write {
    ($($frame: ty),+) => {
        $(
            impl FrameWrite for $frame {
                fn save_frame<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    to_gray(self.view()).save(path)
                }
            }
        )+
    };
}

impl_frame_write!(Array2<f32>, ArrayView2<'_, f32>);

/// 将帧保存为 `dir` 下的 `{title}_{k}.png`, 返回所有文件路径.
pub fn save_frames<P: AsRef<Path>>(
    frames: &[Array2<f32>],
    dir: P,
    title: &str,
) -> SurvosResult<Vec<PathBuf>> {
    frames
        .iter()
        .enumerate()
        .map(|(k, f)| {
            let path = dir.as_ref().join(format!("{title}_{k}.png"));
            f.save_frame(&path)?;
            Ok(path)
        })
        .collect()
}

/// 动画帧的放大倍数.
pub const MOVIE_SCALE: f32 = 1.3;

/// 按 `scale` 缩放, 边长四舍五入且至少为 1.
fn rescale(img: &GrayImage, scale: f32) -> GrayImage {
    let side = |n: u32| ((n as f32 * scale).round() as u32).max(1);
    imageops::resize(img, side(img.width()), side(img.height()), FilterType::Triangle)
}

/// 将帧放大 [`MOVIE_SCALE`] 倍后保存为 10 fps 的循环 GIF 动画.
pub fn save_movie<P: AsRef<Path>>(frames: &[Array2<f32>], path: P) -> SurvosResult<()> {
    let mut encoder = GifEncoder::new(File::create(path)?);
    encoder.set_repeat(Repeat::Infinite)?;
    let frames = frames.iter().map(|f| {
        let gray = rescale(&to_gray(f.view()), MOVIE_SCALE);
        let rgba = RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
            let Luma([v]) = *gray.get_pixel(x, y);
            Rgba([v, v, v, 255])
        });
        Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(100, 1))
    });
    encoder.encode_frames(frames)?;
    Ok(())
}

/// 对每一层截取 `[xstart, xend) * [ystart, yend)`, 得到裁剪后的体数据. 越界时返回 `None`.
pub fn generate_cropped_stack(
    vol: ArrayView3<f32>,
    (xstart, ystart, xend, yend): (usize, usize, usize, usize),
) -> Option<Vol> {
    let (_, dx, dy) = vol.dim();
    if xstart >= xend || ystart >= yend || xend > dx || yend > dy {
        return None;
    }
    Some(vol.slice(s![.., xstart..xend, ystart..yend]).to_owned())
}
