//! 运行配置.
//!
//! 配置由若干 YAML 文档合并而成: 后出现的文档覆盖先出现的同名字段,
//! 嵌套的映射逐键合并. 内置的默认文档见 [`DEFAULT_DOCS`].
//!
//! ```
//! use survos_core::config::AppConfig;
//!
//! let cfg = AppConfig::from_yaml_docs([
//!     survos_core::config::DEFAULT_DOCS.join("\n").as_str(),
//!     "scfg: { proj: vf, random_seed_main: 7 }",
//! ])
//! .unwrap();
//! assert_eq!(cfg.scfg.proj, "vf");
//! assert_eq!(cfg.scfg.random_seed_main, 7);
//! // 未覆盖的字段保持默认值.
//! assert_eq!(cfg.scfg.marker_size, 10);
//! ```

use crate::entity::anno::AnnoParams;
use crate::entity::{PatchParams, WorkflowParams};
use crate::error::SurvosError;
use crate::pipeline::OpSpec;
use crate::volume::RoiBox;
use crate::SurvosResult;
use log::LevelFilter;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SURVOS_CONFIG_YAML: &str = r#"
scfg:
  proj: hunt
  preprocessing: {}
  calculate_features: true
  calculate_supervoxels: true
  load_pretrained_classifier: false
  load_annotation: false
  code_dir: D:/work
  nb_platform: windows
  random_seed_main: 6868842
  marker_size: 10
  refine_lambda: 1.0
  resample_amt: 0.5
  root_dir: D:/
  save_output_files: false
  computing:
    chunks: true
    chunk_size: 1024  # 1 Gb
  mscale: 1.0
  logging:
    level: info
  plot_all: false
  roi_crop: [0, 2500, 0, 2500, 0, 2500]
  feats_idx: 0
  torch_models_fullpath: c:/work/experiments
"#;

const FILTER_YAML: &str = r#"
filter_cfg:
  slic_params:
    compactness: 20
    postprocess: false
    sp_shape: [18, 18, 18]
  filter1:
    plugin: features
    command: compute
    feature: gaussian
    params: 3
    gauss_params:
      sigma: 2
  filter2:
    plugin: features
    command: compute
    feature: gaussian
    params: 3
    gauss_params:
      sigma: 2
  filter3:
    plugin: features
    command: compute
    feature: tv
    tvdenoising3d_params:
      lamda: 3.7
  filter4:
    laplacian_params:
      sigma: 2.1
  filter5:
    gradient_params:
      sigma: 3
"#;

const LOADING_YAML: &str = r#"
loading_cfg:
  code_dir: D:/work
  datasets_dir: D:/datasets/
  experiments_dir: D:/work
  root_dir: D:/
  sdata_rootpath: D:/datasets/VF_S1/
"#;

const PREDICT_YAML: &str = r#"
predict_cfg:
  predict_params:
    n_estimators: 10
    proj: false
"#;

const ENTITY_YAML: &str = r#"
entity_cfg:
  workflow:
    proj: hunt
    workflow_name: make_patches
    entities_offset: [0, 0, 0]
    entities_scale: [1, 1, 1]
    main_bv: [0, 2500, 0, 2500, 0, 2500]
    outdir: ./output
    entity_meta:
      "0": { name: class1, size: [14, 14, 14], core_radius: [7, 7, 7] }
      "1": { name: class2, size: [18, 18, 18], core_radius: [9, 9, 9] }
      "2": { name: class3, size: [18, 18, 18], core_radius: [9, 9, 9] }
      "5": { name: class5, size: [18, 18, 18], core_radius: [9, 9, 9] }
  patch:
    vol_num: 0
    padding: [64, 64, 64]
    num_augs: 2
    get_biggest_cc: false
    max_vols: null
    test_size: 0.2
    split_seed: 42
  anno:
    padding: [64, 64, 64]
    generate_random_bg_entities: false
    num_before_masking: 60
    stratified_selection: false
    class_proportion: { 0: 1.0, 1: 1.0, 2: 1.0, 5: 1.0 }
"#;

const PIPELINE_YAML: &str = r#"
pipeline:
  - { op: median, layer: Main, out: total_mask, median_size: 3, num_iter: 1, thresh: 0.5 }
  - { op: dilate, layer: total_mask, out: total_mask, num_iter: 1, thresh: 0.5 }
  - { op: copy, from: total_mask, to: result }
"#;

/// 内置的默认配置文档, 按合并顺序排列.
pub const DEFAULT_DOCS: [&str; 6] = [
    SURVOS_CONFIG_YAML,
    FILTER_YAML,
    LOADING_YAML,
    PREDICT_YAML,
    ENTITY_YAML,
    PIPELINE_YAML,
];

static DEFAULT_CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // 内置文档在单元测试中验证, 这里解析失败属于编程错误.
    AppConfig::from_yaml_docs(DEFAULT_DOCS).unwrap_or_else(|e| panic!("内置配置非法: {e}"))
});

/// 日志设置.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingCfg {
    /// 日志等级: `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl LoggingCfg {
    /// 转换为 [`LevelFilter`]. 无法识别的等级按 `info` 处理.
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::Info)
    }
}

/// 分块计算设置.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputingCfg {
    /// 是否分块.
    pub chunks: bool,
    /// 块大小 (MB).
    pub chunk_size: usize,
}

/// 项目主配置.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scfg {
    pub proj: String,
    #[serde(default)]
    pub preprocessing: Mapping,
    pub calculate_features: bool,
    pub calculate_supervoxels: bool,
    pub load_pretrained_classifier: bool,
    pub load_annotation: bool,
    pub code_dir: PathBuf,
    pub nb_platform: String,
    /// 全局随机种子.
    pub random_seed_main: u64,
    pub marker_size: usize,
    pub refine_lambda: f64,
    pub resample_amt: f64,
    pub root_dir: PathBuf,
    pub save_output_files: bool,
    pub computing: ComputingCfg,
    pub mscale: f64,
    pub logging: LoggingCfg,
    pub plot_all: bool,
    /// 主 ROI `[z0, z1, x0, x1, y0, y1]`.
    pub roi_crop: RoiBox,
    pub feats_idx: usize,
    pub torch_models_fullpath: PathBuf,
}

/// 超体素参数.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicParams {
    /// 紧致度.
    pub compactness: f64,
    /// 是否后处理.
    pub postprocess: bool,
    /// 超体素形状.
    pub sp_shape: [usize; 3],
}

/// 只有一个 `sigma` 的核参数.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmaParams {
    /// 标准差.
    pub sigma: f64,
}

/// TV 去噪参数.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TvParams {
    /// 正则化强度.
    pub lamda: f64,
}

/// 单个滤波器的描述. 所有字段都是可选的.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub plugin: Option<String>,
    pub command: Option<String>,
    pub feature: Option<String>,
    pub params: Option<u32>,
    pub gauss_params: Option<SigmaParams>,
    pub laplacian_params: Option<SigmaParams>,
    pub gradient_params: Option<SigmaParams>,
    pub tvdenoising3d_params: Option<TvParams>,
}

/// 滤波配置: 超体素参数以及 `filter1`, `filter2` 等命名滤波器.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCfg {
    /// 超体素参数.
    pub slic_params: SlicParams,

    /// 命名滤波器.
    #[serde(flatten)]
    pub filters: BTreeMap<String, FilterSpec>,
}

/// 路径配置.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingCfg {
    pub code_dir: PathBuf,
    pub datasets_dir: PathBuf,
    pub experiments_dir: PathBuf,
    pub root_dir: PathBuf,
    pub sdata_rootpath: PathBuf,
}

/// 分类器参数.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictParams {
    /// 决策树个数.
    pub n_estimators: usize,
    /// 是否投影.
    pub proj: bool,
}

/// 预测配置.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictCfg {
    /// 分类器参数.
    pub predict_params: PredictParams,
}

/// 实体工作流配置.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCfg {
    /// 工作流参数.
    pub workflow: WorkflowParams,
    /// patch 采样参数.
    #[serde(default)]
    pub patch: PatchParams,
    /// 伪标签参数.
    #[serde(default)]
    pub anno: AnnoParams,
}

/// 特征核种类. 核本身由外部实现.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// 高斯滤波.
    Gaussian,
    /// 拉普拉斯.
    Laplacian,
    /// TV 去噪.
    TvDenoising,
}

/// 特征核参数.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParams {
    /// 标准差.
    Sigma(f64),
    /// TV 正则化强度.
    Lamda(f64),
}

/// 一组按顺序计算的特征.
pub type FeatureStack = Vec<(FeatureKind, KernelParams)>;

/// 完整配置.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 项目主配置.
    pub scfg: Scfg,
    /// 滤波配置.
    pub filter_cfg: FilterCfg,
    /// 路径配置.
    pub loading_cfg: LoadingCfg,
    /// 预测配置.
    pub predict_cfg: PredictCfg,
    /// 实体工作流配置.
    pub entity_cfg: EntityCfg,
    /// 掩膜流水线.
    #[serde(default)]
    pub pipeline: Vec<OpSpec>,
}

/// 将 `src` 合并进 `dst`. 两边都是映射时逐键合并, 否则 `src` 覆盖 `dst`.
fn merge_value(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Mapping(d), Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(slot) => merge_value(slot, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

impl AppConfig {
    /// 依次合并 `docs` 中的 YAML 文档并解析.
    ///
    /// 每个文档的顶层都必须是映射 (或为空).
    pub fn from_yaml_docs<'a, I: IntoIterator<Item = &'a str>>(docs: I) -> SurvosResult<Self> {
        let mut merged = Value::Mapping(Mapping::new());
        for doc in docs {
            match serde_yaml::from_str::<Value>(doc)? {
                Value::Null => {}
                v @ Value::Mapping(_) => merge_value(&mut merged, v),
                _ => return Err(SurvosError::invalid("配置文档顶层必须是映射")),
            }
        }
        Ok(serde_yaml::from_value(merged)?)
    }

    /// 内置默认配置.
    #[inline]
    pub fn default_ref() -> &'static Self {
        &DEFAULT_CONFIG
    }

    /// 读取 `path` 处的 YAML 文件, 覆盖在默认配置之上.
    pub fn load<P: AsRef<Path>>(path: P) -> SurvosResult<Self> {
        let user = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading config from {}", path.as_ref().display());
        Self::from_yaml_docs(DEFAULT_DOCS.into_iter().chain([user.as_str()]))
    }

    /// 序列化为 YAML.
    pub fn to_yaml(&self) -> SurvosResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn filter_param(&self, filter: &str, pick: fn(&FilterSpec) -> Option<KernelParams>) -> SurvosResult<KernelParams> {
        self.filter_cfg
            .filters
            .get(filter)
            .and_then(pick)
            .ok_or_else(|| SurvosError::invalid(format!("滤波器 `{filter}` 缺少所需参数")))
    }

    /// 命名特征组: `simple_gaussian`, `vf`, `vf2`.
    pub fn feature_params(&self) -> SurvosResult<BTreeMap<&'static str, FeatureStack>> {
        use FeatureKind::*;

        let gauss = |f: &FilterSpec| f.gauss_params.map(|p| KernelParams::Sigma(p.sigma));
        let laplacian = |f: &FilterSpec| f.laplacian_params.map(|p| KernelParams::Sigma(p.sigma));
        let tv = |f: &FilterSpec| f.tvdenoising3d_params.map(|p| KernelParams::Lamda(p.lamda));

        let g1 = self.filter_param("filter1", gauss)?;
        let g2 = self.filter_param("filter2", gauss)?;
        let lap = self.filter_param("filter4", laplacian)?;
        let tv3 = self.filter_param("filter3", tv)?;

        Ok(BTreeMap::from([
            ("simple_gaussian", vec![(Gaussian, g2)]),
            (
                "vf",
                vec![(Gaussian, g1), (Gaussian, g2), (Laplacian, lap), (TvDenoising, tv3)],
            ),
            ("vf2", vec![(Gaussian, g2)]),
        ]))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

/// 用户配置文件的默认位置 `$HOME/.survos/config.yaml`.
pub fn user_config_path() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.extend([".survos", "config.yaml"]);
    Some(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::layer;
    use crate::pipeline::mask_pipeline_specs;

    #[test]
    fn test_default_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scfg.proj, "hunt");
        assert_eq!(cfg.scfg.random_seed_main, 6868842);
        assert_eq!(cfg.scfg.computing.chunk_size, 1024);
        assert_eq!(cfg.scfg.roi_crop.to_bvol().shape(), (2500, 2500, 2500));
        assert_eq!(cfg.scfg.logging.level_filter(), LevelFilter::Info);
        assert_eq!(cfg.filter_cfg.slic_params.sp_shape, [18, 18, 18]);
        assert_eq!(cfg.filter_cfg.filters.len(), 5);
        assert_eq!(cfg.loading_cfg.sdata_rootpath, PathBuf::from("D:/datasets/VF_S1/"));
        assert_eq!(cfg.predict_cfg.predict_params.n_estimators, 10);
        assert_eq!(cfg.pipeline, mask_pipeline_specs());

        let ent = &cfg.entity_cfg;
        assert_eq!(ent.workflow.entity_meta.len(), 4);
        assert_eq!(ent.workflow.entity_meta["0"].core_radius, Some([7, 7, 7]));
        assert_eq!(ent.patch, PatchParams::default());
        assert_eq!(ent.anno, AnnoParams::default());
    }

    #[test]
    fn test_merge_docs() {
        let cfg = AppConfig::from_yaml_docs(DEFAULT_DOCS.into_iter().chain([
            "scfg: { logging: { level: debug } }\n",
            "pipeline: [ { op: threshold, thresh: 0.3 } ]\n",
            "",
        ]))
        .unwrap();
        assert_eq!(cfg.scfg.logging.level_filter(), LevelFilter::Debug);
        assert_eq!(cfg.scfg.proj, "hunt");
        // 列表整体覆盖.
        assert_eq!(
            cfg.pipeline,
            vec![OpSpec::Threshold {
                layer: layer::MAIN.into(),
                out: layer::RESULT.into(),
                thresh: 0.3
            }]
        );

        let bad = LoggingCfg { level: "loud".into() };
        assert_eq!(bad.level_filter(), LevelFilter::Info);

        assert!(matches!(
            AppConfig::from_yaml_docs(["- 1\n- 2\n"]),
            Err(SurvosError::InvalidArgument(_))
        ));
        assert!(matches!(
            AppConfig::from_yaml_docs(["scfg: {}\n"]),
            Err(SurvosError::Config(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip_and_load() {
        let cfg = AppConfig::default();
        let text = cfg.to_yaml().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, text).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_feature_params() {
        let cfg = AppConfig::default();
        let fp = cfg.feature_params().unwrap();
        assert_eq!(fp["simple_gaussian"], vec![(FeatureKind::Gaussian, KernelParams::Sigma(2.0))]);
        assert_eq!(fp["vf"].len(), 4);
        assert_eq!(fp["vf"][2], (FeatureKind::Laplacian, KernelParams::Sigma(2.1)));
        assert_eq!(fp["vf"][3], (FeatureKind::TvDenoising, KernelParams::Lamda(3.7)));

        let mut cfg = cfg;
        cfg.filter_cfg.filters.remove("filter3");
        assert!(cfg.feature_params().is_err());
    }
}
