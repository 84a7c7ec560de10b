//! 由实体点生成伪标签.
//!
//! 每个实体被画成一个椭球掩膜; 掩膜中心附近的核心区域之外的部分称为 "壳".
//! 这些伪标签可以直接作为检测器的训练目标, 也可以交给 ACWE 等外部操作进一步精化.

use crate::consts::{label, layer, ANNO_CORE_MASK_RADIUS, DEFAULT_PADDING, NUM_BEFORE_MASKING};
use crate::entity::meta::EntityMetaMap;
use crate::entity::patches::PatchWorkflow;
use crate::entity::points::{
    generate_random_points_in_volume, organize_entities, remove_masked_entities,
};
use crate::entity::EntityPoint;
use crate::error::SurvosError;
use crate::pipeline::{BoxedOp, Patch, Pipeline, PipelineParams};
use crate::volume::{binarize, pad_vol, unpad_vol, Vol};
use crate::{Idx3d, SurvosResult};
use itertools::Itertools;
use log::{debug, info};
use ndarray::{s, Zip};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个类别的伪标签.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAnno {
    /// 完整椭球掩膜.
    pub mask: Vol,

    /// 核心区域.
    pub core_mask: Vol,

    /// 壳: `mask & !core_mask`.
    pub shell_mask: Vol,
}

/// 以类别码字符串为键的伪标签.
pub type AnnoMasks = BTreeMap<String, ClassAnno>;

/// 在 `vol` 中以 `center` 为中心, 以 `radius` 为半轴画实心椭球 (值为 1).
///
/// 半轴为 0 的方向只覆盖中心所在的体素.
fn draw_ellipsoid(vol: &mut Vol, (cz, cx, cy): (f64, f64, f64), radius: [usize; 3]) {
    let (dz, dx, dy) = vol.dim();
    let r = radius.map(|r| (r as f64).max(0.5));
    let span = |c: f64, r: f64, n: usize| {
        let lo = (c - r).floor().max(0.0) as usize;
        let hi = ((c + r).ceil() + 1.0).clamp(0.0, n as f64) as usize;
        lo..hi.max(lo)
    };
    let (rz, rx, ry) = (span(cz, r[0], dz), span(cx, r[1], dx), span(cy, r[2], dy));
    for (z, x, y) in itertools::iproduct!(rz, rx, ry) {
        let d = ((z as f64 - cz) / r[0]).powi(2)
            + ((x as f64 - cx) / r[1]).powi(2)
            + ((y as f64 - cy) / r[2]).powi(2);
        if d <= 1.0 {
            vol[[z, x, y]] = 1.0;
        }
    }
}

/// 为 `meta` 中每个类别的实体生成伪标签.
///
/// 在以 `padding` 填充后的坐标系中, 每个实体画一个半轴为 `size / 2` 的椭球掩膜,
/// 以及半轴为核心半径的椭球核心区域. 类别没有指定核心半径时使用 `core_mask_radius`.
/// 最后去掉填充, 得到与 `shape` 形状一致的结果.
pub fn generate_anno(
    shape: Idx3d,
    meta: &EntityMetaMap,
    padding: [usize; 3],
    core_mask_radius: [usize; 3],
) -> AnnoMasks {
    let padded_shape = (
        shape.0 + 2 * padding[0],
        shape.1 + 2 * padding[1],
        shape.2 + 2 * padding[2],
    );
    let shift = padding.map(|p| p as f64);

    meta.iter()
        .map(|(code, m)| {
            let mut mask = Vol::zeros(padded_shape);
            let mut core = Vol::zeros(padded_shape);
            let semi = m.size.map(|s| s / 2);
            let core_r = m.core_radius.unwrap_or(core_mask_radius);
            for p in &m.entities {
                let c = p.shifted((shift[0], shift[1], shift[2])).pos();
                draw_ellipsoid(&mut mask, c, semi);
                draw_ellipsoid(&mut core, c, core_r);
            }
            let mut shell = Vol::zeros(padded_shape);
            Zip::from(&mut shell)
                .and(&mask)
                .and(&core)
                .for_each(|s, &m, &c| *s = if m > 0.0 && c <= 0.0 { 1.0 } else { 0.0 });

            debug!("class `{code}`: {} entities, semi axes {semi:?}", m.entities.len());
            let anno = ClassAnno {
                mask: unpad_vol(mask.view(), padding),
                core_mask: unpad_vol(core.view(), padding),
                shell_mask: unpad_vol(shell.view(), padding),
            };
            (code.clone(), anno)
        })
        .collect()
}

/// [`make_pseudomasks`] 的结果.
#[derive(Debug, Clone)]
pub struct PseudoMasks {
    /// 各类别伪标签.
    pub masks: AnnoMasks,

    /// 各类别掩膜 (按类别顺序), 最后一个元素为所有壳之和.
    pub anno_all: Vec<Vol>,

    /// 所有掩膜之和.
    pub anno_gen: Vol,

    /// ACWE 精化结果. 只有提供了 ACWE 操作时才存在.
    pub acwe: Option<Vol>,
}

fn sum_vols<'a>(shape: Idx3d, vols: impl Iterator<Item = &'a Vol>) -> Vol {
    vols.fold(Vol::zeros(shape), |acc, v| acc + v)
}

/// 生成伪标签, 并可选地用 `acwe` 操作精化.
///
/// `acwe` 在一个只有一步的流水线中运行. 其输入 `Patch` 包含图像图层 `Main`
/// (即 `wf.vols[0]`) 与 `total_mask` (所有掩膜之和二值化), 以及几何图层
/// `Points` (类别 `"0"` 的实体). 运行结束后取其 `acwe` 图像图层.
pub fn make_pseudomasks(
    wf: &PatchWorkflow,
    meta: &EntityMetaMap,
    padding: [usize; 3],
    core_mask_radius: [usize; 3],
    acwe: Option<BoxedOp>,
) -> SurvosResult<PseudoMasks> {
    let vol = wf
        .vols
        .first()
        .ok_or_else(|| SurvosError::invalid("工作流中没有体数据"))?;
    let shape = vol.dim();
    let masks = generate_anno(shape, meta, padding, core_mask_radius);

    let anno_gen = sum_vols(shape, masks.values().map(|a| &a.mask));
    let anno_shell_gen = sum_vols(shape, masks.values().map(|a| &a.shell_mask));
    let mut anno_all: Vec<Vol> = masks.values().map(|a| a.mask.clone()).collect();
    anno_all.push(anno_shell_gen);

    let acwe = match acwe {
        Some(op) => {
            let mut p = Patch::from_image(layer::MAIN, vol.clone());
            let points = meta
                .get("0")
                .map(|m| m.entities.clone())
                .unwrap_or_default();
            p.set_geometry(layer::POINTS, points);
            p.set_image(layer::TOTAL_MASK, binarize(anno_gen.view(), f32::MIN_POSITIVE));

            let mut pipeline = Pipeline::new(PipelineParams::new("acwe", vec![op]));
            pipeline.init_payload(p);
            let mut p = pipeline.run()?;
            Some(p.take_image(layer::ACWE)?)
        }
        None => None,
    };

    Ok(PseudoMasks {
        masks,
        anno_all,
        anno_gen,
        acwe,
    })
}

/// 整理 `entities` 并生成伪标签. 核心半径为 `ANNO_CORE_MASK_RADIUS`.
///
/// 整理后的元信息会写回 `wf.params.entity_meta`.
pub fn make_anno(
    wf: &mut PatchWorkflow,
    entities: &[EntityPoint],
    mut meta: EntityMetaMap,
    padding: [usize; 3],
    acwe: Option<BoxedOp>,
) -> SurvosResult<PseudoMasks> {
    organize_entities(entities, &mut meta, false);
    let masks = make_pseudomasks(wf, &meta, padding, ANNO_CORE_MASK_RADIUS, acwe)?;
    wf.params.entity_meta = meta;
    Ok(masks)
}

fn default_padding() -> [usize; 3] {
    DEFAULT_PADDING
}

fn default_num_before_masking() -> usize {
    NUM_BEFORE_MASKING
}

fn default_class_proportion() -> BTreeMap<u32, f64> {
    BTreeMap::from([(0, 1.0), (1, 1.0), (2, 1.0), (5, 1.0)])
}

/// [`generate_annotation_volume`] 参数.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnoParams {
    /// 伪标签生成时的填充.
    #[serde(default = "default_padding")]
    pub padding: [usize; 3],

    /// 是否生成随机背景实体.
    #[serde(default)]
    pub generate_random_bg_entities: bool,

    /// 随机背景实体在掩膜过滤前的个数.
    #[serde(default = "default_num_before_masking")]
    pub num_before_masking: usize,

    /// 是否按类别比例抽样实体.
    #[serde(default)]
    pub stratified_selection: bool,

    /// 每个类别的抽样比例. 未列出的类别按 1.0 处理.
    #[serde(default = "default_class_proportion")]
    pub class_proportion: BTreeMap<u32, f64>,
}

impl Default for AnnoParams {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            generate_random_bg_entities: false,
            num_before_masking: NUM_BEFORE_MASKING,
            stratified_selection: false,
            class_proportion: default_class_proportion(),
        }
    }
}

/// [`generate_annotation_volume`] 的结果.
#[derive(Debug, Clone)]
pub struct AnnotationVolume {
    /// 伪标签.
    pub masks: PseudoMasks,

    /// 参与生成伪标签的实体.
    pub gt_entities: Vec<EntityPoint>,

    /// 随机背景实体 (类别码为 `RANDOM_BACKGROUND_CLASS`). 未要求生成时为空.
    pub random_entities: Vec<EntityPoint>,
}

/// 按类别比例不放回地抽样实体. 结果按类别码升序分组.
///
/// 每个类别抽取 `floor(prop * n)` 个互不相同的实体, 因此比例为 1 时保留该类别全部实体.
/// 比例截断到 `[0, 1]`, 未列出的类别按 1 处理.
fn stratified_select<R: Rng + ?Sized>(
    entities: &[EntityPoint],
    class_proportion: &BTreeMap<u32, f64>,
    rng: &mut R,
) -> Vec<EntityPoint> {
    let classes: Vec<u32> = entities
        .iter()
        .map(|p| p.class_code)
        .sorted_unstable()
        .dedup()
        .collect();
    let mut selected = Vec::new();
    for c in classes {
        let single: Vec<EntityPoint> = entities.iter().filter(|p| p.class_code == c).copied().collect();
        let prop = class_proportion.get(&c).copied().unwrap_or(1.0).clamp(0.0, 1.0);
        let n = (prop * single.len() as f64) as usize;
        selected.extend(single.choose_multiple(rng, n).copied());
    }
    info!("Produced {} entities.", selected.len());
    selected
}

/// 由工作流中的实体生成伪标签体数据.
///
/// 1. `stratified_selection` 为真时按 `class_proportion` 抽样实体, 否则使用全部实体.
/// 2. `generate_random_bg_entities` 为真时在体数据中随机生成 `num_before_masking` 个点,
///    去掉落在 `wf.bg_mask` 前景上的点, 并将类别码设为 `RANDOM_BACKGROUND_CLASS`.
/// 3. 调用 [`make_anno`].
pub fn generate_annotation_volume<R: Rng + ?Sized>(
    wf: &mut PatchWorkflow,
    meta: EntityMetaMap,
    params: &AnnoParams,
    acwe: Option<BoxedOp>,
    rng: &mut R,
) -> SurvosResult<AnnotationVolume> {
    let gt_entities = if params.stratified_selection {
        stratified_select(&wf.locs, &params.class_proportion, rng)
    } else {
        wf.locs.clone()
    };

    let random_entities = if params.generate_random_bg_entities {
        let shape = wf
            .vols
            .first()
            .map(|v| v.dim())
            .ok_or_else(|| SurvosError::invalid("工作流中没有体数据"))?;
        let candidates = generate_random_points_in_volume(shape, params.num_before_masking, rng);
        let kept = remove_masked_entities(wf.bg_mask.view(), &candidates);
        info!(
            "Random background entities: {} before masking, {} after",
            candidates.len(),
            kept.len()
        );
        kept.into_iter()
            .map(|p| EntityPoint {
                class_code: label::RANDOM_BACKGROUND_CLASS,
                ..p
            })
            .collect()
    } else {
        Vec::new()
    };

    let masks = make_anno(wf, &gt_entities, meta, params.padding, acwe)?;
    Ok(AnnotationVolume {
        masks,
        gt_entities,
        random_entities,
    })
}

/// 对伪标签掩膜按 z 切片求和, 用于快速检查每层的覆盖情况.
pub fn coverage_per_slice(mask: &Vol) -> Vec<f32> {
    (0..mask.dim().0)
        .map(|z| mask.slice(s![z, .., ..]).sum())
        .collect()
}
