//! 以实体点为中心的 patch 数据集生成.

use super::dataset::{SmallVolDataset, VolDataset};
use super::meta::EntityMetaMap;
use super::points::{crop_vol_and_pts_bb, offset_points, organize_entities, scale_and_offset};
use super::sampler::{centroid_to_bvol, sample_marked_patches};
use super::EntityPoint;
use crate::consts::{
    AUG_OFFSET_SCALE, DEFAULT_PADDING, LOADER_TEST_SIZE, MASK_VOL_SIZE, PATCH_TEST_SIZE,
    SPLIT_SEED,
};
use crate::error::SurvosError;
use crate::volume::{
    flip_lr, flip_ud, largest_cc, pad_vol, stack_vols, unique_values, viz_bvols, RoiBox, Vol,
};
use crate::SurvosResult;
use log::{debug, info};
use ndarray::ArrayView3;
use ndarray_npy::NpzWriter;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

fn unit_scale() -> [f64; 3] {
    [1.0; 3]
}

/// 工作流参数. 对应项目配置文件中的实体相关字段.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowParams {
    /// 项目名. 用作输出文件名前缀.
    pub proj: String,

    /// 工作流名.
    #[serde(default)]
    pub workflow_name: String,

    /// 实体坐标偏移.
    #[serde(default)]
    pub entities_offset: [f64; 3],

    /// 实体坐标缩放.
    #[serde(default = "unit_scale")]
    pub entities_scale: [f64; 3],

    /// 实体类别元信息.
    pub entity_meta: EntityMetaMap,

    /// 主 ROI. 体数据与实体点都会被裁剪到该区域.
    pub main_bv: RoiBox,

    /// 输出目录.
    #[serde(default)]
    pub outdir: PathBuf,
}

/// 实体工作流状态.
#[derive(Clone, Debug)]
pub struct PatchWorkflow {
    /// 裁剪后的体数据. 通常为同一体数据的两份.
    pub vols: Vec<Vol>,

    /// 按类别整理后的实体点 (ROI 坐标系).
    pub locs: Vec<EntityPoint>,

    /// 各类别元信息, 其中 `entities` 已被填充.
    pub entities: EntityMetaMap,

    /// 背景掩膜. 随机背景实体不会落在其前景上.
    pub bg_mask: Vol,

    /// 参数.
    pub params: WorkflowParams,

    /// 金标准实体点 (原始坐标系).
    pub gold: Vec<EntityPoint>,
}

/// 初始化实体工作流.
///
/// 实体点先做缩放与偏移, 然后体数据和实体点一同被裁剪到 `main_bv`,
/// 最后按类别整理. 背景掩膜初始化为全零.
pub fn init_entity_workflow(
    img: ArrayView3<f32>,
    entity_pts: &[EntityPoint],
    gold_pts: &[EntityPoint],
    params: WorkflowParams,
) -> SurvosResult<PatchWorkflow> {
    info!("Loaded image volume of shape {:?}", img.dim());
    let entity_pts = scale_and_offset(entity_pts, params.entities_scale, params.entities_offset);
    let gold = scale_and_offset(gold_pts, params.entities_scale, params.entities_offset);

    let roi = params.main_bv;
    debug!("main bounding box: {}", roi.name());
    let (cropped, cropped_pts) =
        crop_vol_and_pts_bb(img, &entity_pts, &roi, true).ok_or(SurvosError::OutOfBounds {
            bvol: roi.to_bvol().to_array(),
            shape: img.dim(),
        })?;

    let mut entities = params.entity_meta.clone();
    let locs = organize_entities(&cropped_pts, &mut entities, false);
    info!("Loaded {} entities, {} gold entities", locs.len(), gold.len());

    Ok(PatchWorkflow {
        bg_mask: Vol::zeros(cropped.dim()),
        vols: vec![cropped.clone(), cropped],
        locs,
        entities,
        params,
        gold,
    })
}

fn default_num_augs() -> usize {
    2
}

fn default_padding() -> [usize; 3] {
    DEFAULT_PADDING
}

fn default_test_size() -> f64 {
    PATCH_TEST_SIZE
}

fn default_seed() -> u64 {
    SPLIT_SEED
}

/// [`make_patches`] 参数.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchParams {
    /// 使用 `wf.vols` 中的第几个体数据.
    #[serde(default)]
    pub vol_num: usize,

    /// 填充大小, 同时也是 patch 大小.
    #[serde(default = "default_padding")]
    pub padding: [usize; 3],

    /// 数据增强份数. 为 0 时不做随机偏移与翻转.
    #[serde(default = "default_num_augs")]
    pub num_augs: usize,

    /// 标签 patch 是否只保留最大连通域.
    #[serde(default)]
    pub get_biggest_cc: bool,

    /// 最多保留多少个 patch.
    #[serde(default)]
    pub max_vols: Option<usize>,

    /// 测试集比例.
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// 划分训练/测试集的随机种子.
    #[serde(default = "default_seed")]
    pub split_seed: u64,
}

impl Default for PatchParams {
    fn default() -> Self {
        Self {
            vol_num: 0,
            padding: DEFAULT_PADDING,
            num_augs: default_num_augs(),
            get_biggest_cc: false,
            max_vols: None,
            test_size: PATCH_TEST_SIZE,
            split_seed: SPLIT_SEED,
        }
    }
}

/// 随机划分 `0..n`, 返回 `(训练集下标, 测试集下标)`.
///
/// 测试集大小为 `ceil(test_size * n)`. 相同的 `seed` 总是得到相同的划分.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> SurvosResult<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_size) {
        return Err(SurvosError::invalid(format!(
            "test_size 必须位于 [0, 1) 内, 实际为 {test_size}"
        )));
    }
    let n_test = ((test_size * n as f64).ceil() as usize).min(n);
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = perm.split_off(n_test);
    Ok((train, perm))
}

fn pick<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| items[i].clone()).collect()
}

fn class_names(label_vols: &[Vol]) -> Vec<u32> {
    let mut names: Vec<u32> = label_vols
        .iter()
        .flat_map(|v| unique_values(v.view()))
        .map(|v| v.max(0.0) as u32)
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// 准备训练/测试数据集: 标签以 `> 0` 二值化后划分.
///
/// `test_size` 为 `None` 时使用 [`LOADER_TEST_SIZE`].
pub fn prepare_split(
    img_vols: Vec<Vol>,
    label_vols: Vec<Vol>,
    test_size: Option<f64>,
    seed: u64,
) -> SurvosResult<(SmallVolDataset, SmallVolDataset)> {
    if img_vols.len() != label_vols.len() {
        return Err(SurvosError::invalid(format!(
            "图像个数 {} 与标签个数 {} 不一致",
            img_vols.len(),
            label_vols.len()
        )));
    }
    let label_vols: Vec<Vol> = label_vols
        .into_iter()
        .map(|v| v.mapv(|p| if p > 0.0 { 1.0 } else { 0.0 }))
        .collect();
    let test_size = test_size.unwrap_or(LOADER_TEST_SIZE);
    let (train, test) = train_test_split(img_vols.len(), test_size, seed)?;
    let build = |idx: &[usize]| {
        let labels = pick(&label_vols, idx);
        let names = class_names(&labels);
        SmallVolDataset::new(pick(&img_vols, idx), labels).with_class_names(names)
    };
    let (train_ds, test_ds) = (build(&train), build(&test));
    info!(
        "Prepared train: {} and test: {}",
        train_ds.len(),
        test_ds.len()
    );
    Ok((train_ds, test_ds))
}

/// [`make_patches`] 的结果.
#[derive(Clone, Debug)]
pub struct PatchSet {
    /// 图像 patch. 原始 patch 在前, 翻转增强的 patch 在后.
    pub img_vols: Vec<Vol>,

    /// 标签 patch, 与 `img_vols` 一一对应.
    pub label_vols: Vec<Vol>,

    /// 每个 patch 的中心点 (填充后坐标系).
    pub locs: Vec<EntityPoint>,

    /// 可视化用真值掩膜: 每个实体处为一个 `MASK_VOL_SIZE` 大小的立方体.
    pub mask_gt: Vol,

    /// 训练集下标.
    pub train_idx: Vec<usize>,

    /// 测试集下标.
    pub test_idx: Vec<usize>,
}

/// [`PatchSet`] 保存后的三个文件路径.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPatches {
    /// 图像 patch.
    pub img_vols: PathBuf,
    /// 标签 patch.
    pub label_vols: PathBuf,
    /// 真值掩膜.
    pub mask_gt: PathBuf,
}

/// [`PatchSet`] 的元数据快照 (不含体数据).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchSetMeta {
    /// patch 个数.
    pub n_vols: usize,
    /// 单个 patch 的形状.
    pub patch_shape: Option<(usize, usize, usize)>,
    /// 每个 patch 的中心点.
    pub locs: Vec<EntityPoint>,
    /// 训练集下标.
    pub train_idx: Vec<usize>,
    /// 测试集下标.
    pub test_idx: Vec<usize>,
    /// 训练集标签中的类别.
    pub class_names: Vec<u32>,
    /// 生成时间.
    pub created: String,
}

impl PatchSetMeta {
    /// 从 `path` 读取快照.
    pub fn load<P: AsRef<Path>>(path: P) -> SurvosResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// 将快照写入 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SurvosResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }
}

/// 当前时间, 形如 `1510_0930` (日月_时分).
pub fn dt_string() -> String {
    chrono::Local::now().format("%d%m_%H%M").to_string()
}

fn write_stack(path: &Path, vols: &[Vol]) -> SurvosResult<()> {
    let data = stack_vols(vols).ok_or_else(|| SurvosError::invalid("没有可保存的 patch"))?;
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("data", &data)?;
    npz.finish()?;
    Ok(())
}

impl PatchSet {
    /// patch 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.img_vols.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.img_vols.is_empty()
    }

    /// 按划分构建训练/测试数据集.
    pub fn datasets(&self) -> (SmallVolDataset, SmallVolDataset) {
        let build = |idx: &[usize]| {
            let labels = pick(&self.label_vols, idx);
            let names = class_names(&labels);
            SmallVolDataset::new(pick(&self.img_vols, idx), labels).with_class_names(names)
        };
        (build(&self.train_idx), build(&self.test_idx))
    }

    /// 元数据快照.
    pub fn meta(&self) -> PatchSetMeta {
        PatchSetMeta {
            n_vols: self.len(),
            patch_shape: self.img_vols.first().map(|v| v.dim()),
            locs: self.locs.clone(),
            train_idx: self.train_idx.clone(),
            test_idx: self.test_idx.clone(),
            class_names: class_names(&pick(&self.label_vols, &self.train_idx)),
            created: dt_string(),
        }
    }

    /// 将图像 patch, 标签 patch 和真值掩膜分别保存为 `dir` 下的 npz 文件.
    ///
    /// 文件名形如 `{proj}_patch_vols{n}_img_vols_{stamp}.npz`,
    /// `{proj}_patch_vols{n}_img_labels_{stamp}.npz` 与
    /// `{proj}_patch_vols_{n}_mask_gt_{stamp}.npz`. patch 被堆叠为 `data` 数组.
    pub fn save_npz<P: AsRef<Path>>(&self, dir: P, proj: &str, stamp: &str) -> SurvosResult<SavedPatches> {
        let dir = dir.as_ref();
        let n = self.len();
        let saved = SavedPatches {
            img_vols: dir.join(format!("{proj}_patch_vols{n}_img_vols_{stamp}.npz")),
            label_vols: dir.join(format!("{proj}_patch_vols{n}_img_labels_{stamp}.npz")),
            mask_gt: dir.join(format!("{proj}_patch_vols_{n}_mask_gt_{stamp}.npz")),
        };

        write_stack(&saved.img_vols, &self.img_vols)?;
        info!("Saving image vols {}", saved.img_vols.display());
        write_stack(&saved.label_vols, &self.label_vols)?;
        info!("Saving label vols {}", saved.label_vols.display());

        let mut npz = NpzWriter::new(File::create(&saved.mask_gt)?);
        npz.add_array("data", &self.mask_gt)?;
        npz.finish()?;
        info!("Saving mask gt {}", saved.mask_gt.display());

        Ok(saved)
    }
}

/// 以 `selected_locs` 为中心生成 patch 数据集.
///
/// 1. 每个实体处绘制 `MASK_VOL_SIZE` 大小的立方体, 得到真值掩膜.
/// 2. 图像体数据与 `proposal_vol` 都以 `padding` 填充.
/// 3. `num_augs > 0` 时, 中心点被随机偏移 `num_augs` 次并拼接; 否则只做固定偏移.
/// 4. 以偏移后的中心点从两个填充后的体数据中采样, patch 大小等于 `padding`.
/// 5. `num_augs > 0` 时, 每个 patch 追加左右翻转和上下翻转两个副本.
/// 6. `get_biggest_cc` 为真时, 标签 patch 只保留最大连通域.
/// 7. 按 `max_vols` 截断.
/// 8. 划分训练/测试集.
///
/// # 返回值
///
/// `proposal_vol` 形状与图像体数据不一致, `vol_num` 越界, 或者 `selected_locs`
/// 为空时返回 `Err`.
pub fn make_patches<R: Rng + ?Sized>(
    wf: &PatchWorkflow,
    selected_locs: &[EntityPoint],
    proposal_vol: ArrayView3<f32>,
    params: &PatchParams,
    rng: &mut R,
) -> SurvosResult<PatchSet> {
    if selected_locs.is_empty() {
        return Err(SurvosError::invalid("没有选中的实体"));
    }
    let vol = wf.vols.get(params.vol_num).ok_or_else(|| {
        SurvosError::invalid(format!("vol_num {} 越界 (共 {})", params.vol_num, wf.vols.len()))
    })?;
    if vol.dim() != proposal_vol.dim() {
        return Err(SurvosError::ShapeMismatch(vol.dim(), proposal_vol.dim()));
    }
    info!("Making patches for {} locations", selected_locs.len());

    let mask_gt = viz_bvols(
        wf.vols[0].dim(),
        &centroid_to_bvol(selected_locs, MASK_VOL_SIZE, false),
    );

    let padding = params.padding;
    let padded_vol = pad_vol(vol.view(), padding);
    let padded_anno = pad_vol(proposal_vol, padding);

    let offset = padding.map(|p| p as f64);
    let some_pts: Vec<EntityPoint> = if params.num_augs > 0 {
        (0..params.num_augs)
            .flat_map(|_| offset_points(selected_locs, offset, AUG_OFFSET_SCALE, true, &mut *rng))
            .collect()
    } else {
        offset_points(selected_locs, offset, AUG_OFFSET_SCALE, false, rng)
    };
    debug!("Augmented point locations: {}", some_pts.len());

    let marked_anno = sample_marked_patches(padded_anno.view(), &some_pts, padding);
    let marked = sample_marked_patches(padded_vol.view(), &some_pts, padding);
    let mut img_vols = marked.vols;
    let mut label_vols = marked_anno.vols;
    let mut locs = marked.vols_locs;

    if params.num_augs > 0 {
        let flipped = |vols: &[Vol]| -> Vec<Vol> {
            vols.iter()
                .flat_map(|v| [flip_lr(v.view()), flip_ud(v.view())])
                .collect()
        };
        let img_flipped = flipped(&img_vols);
        let label_flipped = flipped(&label_vols);
        let loc_flipped: Vec<EntityPoint> = locs.iter().flat_map(|&p| [p, p]).collect();
        img_vols.extend(img_flipped);
        label_vols.extend(label_flipped);
        locs.extend(loc_flipped);
    }

    if params.get_biggest_cc {
        label_vols = label_vols.iter().map(|v| largest_cc(v.view())).collect();
    }

    if let Some(max_vols) = params.max_vols.filter(|&m| m > 0) {
        img_vols.truncate(max_vols);
        label_vols.truncate(max_vols);
        locs.truncate(max_vols);
    }

    let (train_idx, test_idx) = train_test_split(img_vols.len(), params.test_size, params.split_seed)?;
    info!(
        "Augmented image vols: {}, train: {}, test: {}",
        img_vols.len(),
        train_idx.len(),
        test_idx.len()
    );

    Ok(PatchSet {
        img_vols,
        label_vols,
        locs,
        mask_gt,
        train_idx,
        test_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::meta::EntityMeta;
    use ndarray::{s, Array3};

    fn params() -> WorkflowParams {
        let mut meta = EntityMetaMap::new();
        meta.insert("0".into(), EntityMeta::new("a", [8, 8, 8]));
        meta.insert("1".into(), EntityMeta::new("b", [6, 6, 6]));
        WorkflowParams {
            proj: "t".into(),
            workflow_name: "wf".into(),
            entities_offset: [1.0, 0.0, 0.0],
            entities_scale: [1.0; 3],
            entity_meta: meta,
            main_bv: RoiBox::from([2, 34, 0, 32, 0, 32]),
            outdir: PathBuf::new(),
        }
    }

    fn workflow() -> PatchWorkflow {
        let img = Array3::from_shape_fn((40, 32, 32), |(z, x, y)| ((z + x + y) % 7) as f32);
        let pts = [
            EntityPoint::new(15.0, 16.0, 16.0, 0),
            EntityPoint::new(9.0, 8.0, 8.0, 1),
            // 落在 ROI 外.
            EntityPoint::new(0.0, 8.0, 8.0, 1),
        ];
        init_entity_workflow(img.view(), &pts, &pts[..1], params()).unwrap()
    }

    #[test]
    fn test_init_entity_workflow() {
        let wf = workflow();
        assert_eq!(wf.vols.len(), 2);
        assert_eq!(wf.vols[0].dim(), (32, 32, 32));
        assert_eq!(wf.bg_mask.sum(), 0.0);
        // 偏移 +1, 再平移到 ROI 原点 (z - 2).
        assert_eq!(wf.locs, vec![
            EntityPoint::new(14.0, 16.0, 16.0, 0),
            EntityPoint::new(8.0, 8.0, 8.0, 1),
        ]);
        assert_eq!(wf.entities["1"].entities.len(), 1);
        assert_eq!(wf.gold[0].z, 16.0);

        let mut bad = params();
        bad.main_bv = RoiBox::from([0, 64, 0, 32, 0, 32]);
        let img = Array3::<f32>::zeros((40, 32, 32));
        assert!(matches!(
            init_entity_workflow(img.view(), &[], &[], bad),
            Err(SurvosError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_train_test_split() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);
        let mut all: Vec<_> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(train_test_split(10, 0.2, 42).unwrap(), (train, test));

        assert_eq!(train_test_split(3, 0.1, 0).unwrap().1.len(), 1);
        assert_eq!(train_test_split(0, 0.2, 0).unwrap(), (vec![], vec![]));
        assert!(train_test_split(3, 1.0, 0).is_err());
    }

    #[test]
    fn test_make_patches_no_aug() {
        let wf = workflow();
        let mut proposal = Vol::zeros(wf.vols[0].dim());
        proposal.slice_mut(s![12..17, 14..19, 14..19]).fill(1.0);
        let p = PatchParams {
            padding: [8, 8, 8],
            num_augs: 0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let set = make_patches(&wf, &wf.locs, proposal.view(), &p, &mut rng).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.img_vols[0].dim(), (8, 8, 8));
        // 第一个 patch 以 (14, 16, 16) 为中心, 对应原体数据 [10, 18).
        assert_eq!(set.img_vols[0], wf.vols[0].slice(s![10..18, 12..20, 12..20]));
        assert_eq!(set.label_vols[0].sum(), proposal.slice(s![10..18, 12..20, 12..20]).sum());
        assert_eq!(set.test_idx.len(), 1);
        assert_eq!(set.mask_gt.dim(), wf.vols[0].dim());
        assert_eq!(set.mask_gt[[14, 16, 16]], 1.0);
    }

    #[test]
    fn test_make_patches_aug_and_cc() {
        let wf = workflow();
        let mut proposal = Vol::zeros(wf.vols[0].dim());
        proposal.slice_mut(s![13..16, 15..18, 15..18]).fill(1.0);
        proposal[[8, 8, 8]] = 1.0;
        let p = PatchParams {
            padding: [16, 16, 16],
            num_augs: 2,
            get_biggest_cc: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let set = make_patches(&wf, &wf.locs, proposal.view(), &p, &mut rng).unwrap();
        // 2 个实体 * 2 份增强 = 4, 再加 8 个翻转.
        assert_eq!(set.len(), 12);
        assert_eq!(set.locs.len(), 12);
        assert_eq!(set.train_idx.len() + set.test_idx.len(), 12);
        assert_eq!(set.test_idx.len(), 3);
        for (img, lbl) in set.img_vols.iter().zip(set.label_vols.iter()) {
            assert_eq!(img.dim(), (16, 16, 16));
            assert!(lbl.iter().all(|&v| v == 0.0 || v == 1.0));
        }
        // 翻转副本与原 patch 元素和一致.
        assert_eq!(set.img_vols[4].sum(), set.img_vols[0].sum());
        assert_eq!(set.img_vols[5].sum(), set.img_vols[0].sum());

        let p = PatchParams {
            max_vols: Some(5),
            ..p
        };
        let set = make_patches(&wf, &wf.locs, proposal.view(), &p, &mut rng).unwrap();
        assert_eq!(set.len(), 5);
        let (train, test) = set.datasets();
        assert_eq!(train.len() + test.len(), 5);
    }

    #[test]
    fn test_make_patches_errors() {
        let wf = workflow();
        let mut rng = StdRng::seed_from_u64(0);
        let p = PatchParams::default();
        let bad = Vol::zeros((1, 1, 1));
        assert!(matches!(
            make_patches(&wf, &wf.locs, bad.view(), &p, &mut rng),
            Err(SurvosError::ShapeMismatch(..))
        ));
        let proposal = Vol::zeros(wf.vols[0].dim());
        assert!(make_patches(&wf, &[], proposal.view(), &p, &mut rng).is_err());
        let p = PatchParams {
            vol_num: 5,
            ..p
        };
        assert!(make_patches(&wf, &wf.locs, proposal.view(), &p, &mut rng).is_err());
    }

    #[test]
    fn test_prepare_split() {
        let imgs: Vec<Vol> = (0..10).map(|i| Vol::from_elem((2, 2, 2), i as f32)).collect();
        let labels: Vec<Vol> = (0..10).map(|i| Vol::from_elem((2, 2, 2), (i % 3) as f32)).collect();
        let (train, test) = prepare_split(imgs.clone(), labels.clone(), None, 42).unwrap();
        assert_eq!(test.len(), 1);
        assert_eq!(train.len(), 9);
        assert_eq!(train.class_names, vec![0, 1]);
        let (_, lbl) = train.get(0).unwrap();
        assert!(lbl.iter().all(|&v| v == 0.0 || v == 1.0));

        let (train, test) = prepare_split(imgs, labels, Some(0.5), 42).unwrap();
        assert_eq!((train.len(), test.len()), (5, 5));

        assert!(prepare_split(vec![Vol::zeros((1, 1, 1))], vec![], None, 0).is_err());
    }

    #[test]
    fn test_save_npz_and_meta() {
        let set = PatchSet {
            img_vols: vec![Vol::ones((2, 2, 2)); 3],
            label_vols: vec![Vol::zeros((2, 2, 2)); 3],
            locs: vec![EntityPoint::default(); 3],
            mask_gt: Vol::zeros((4, 4, 4)),
            train_idx: vec![0, 2],
            test_idx: vec![1],
        };
        let dir = tempfile::tempdir().unwrap();
        let saved = set.save_npz(dir.path(), "proj", "1510_0930").unwrap();
        assert!(saved
            .img_vols
            .ends_with("proj_patch_vols3_img_vols_1510_0930.npz"));
        assert!(saved
            .mask_gt
            .ends_with("proj_patch_vols_3_mask_gt_1510_0930.npz"));

        let mut npz = ndarray_npy::NpzReader::new(File::open(&saved.img_vols).unwrap()).unwrap();
        let data: ndarray::Array4<f32> = npz.by_name("data").unwrap();
        assert_eq!(data.dim(), (3, 2, 2, 2));

        let meta = set.meta();
        let path = dir.path().join("meta.bin");
        meta.save(&path).unwrap();
        assert_eq!(PatchSetMeta::load(&path).unwrap(), meta);
        assert_eq!(meta.class_names, vec![0]);
    }
}
