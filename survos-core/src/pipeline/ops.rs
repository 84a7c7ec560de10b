//! 内置的流水线操作. 可由配置 (`pipeline` 段) 反序列化得到.

use super::{Patch, PatchOp};
use crate::consts::layer;
use crate::volume::{self, filter, morph};
use crate::SurvosResult;
use log::info;
use serde::{Deserialize, Serialize};

fn main_layer() -> String {
    layer::MAIN.to_string()
}

fn result_layer() -> String {
    layer::RESULT.to_string()
}

fn default_thresh() -> f32 {
    0.5
}

fn one() -> usize {
    1
}

fn three() -> usize {
    3
}

/// 内置操作的描述.
///
/// 以 `op` 字段区分种类, 例如
///
/// ```yaml
/// - op: median
///   layer: Main
///   out: total_mask
///   median_size: 4
///   num_iter: 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpSpec {
    /// 二值腐蚀.
    Erode {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 迭代次数.
        #[serde(default = "one")]
        num_iter: usize,
        /// 二值化阈值.
        #[serde(default = "default_thresh")]
        thresh: f32,
    },

    /// 二值膨胀.
    Dilate {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 迭代次数.
        #[serde(default = "one")]
        num_iter: usize,
        /// 二值化阈值.
        #[serde(default = "default_thresh")]
        thresh: f32,
    },

    /// 二值化后中值滤波.
    Median {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 中值滤波窗口边长.
        #[serde(default = "three")]
        median_size: usize,
        /// 迭代次数.
        #[serde(default = "one")]
        num_iter: usize,
        /// 二值化阈值.
        #[serde(default = "default_thresh")]
        thresh: f32,
    },

    /// `1 - v`.
    Invert {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
    },

    /// 伽马校正.
    Gamma {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 伽马值.
        gamma: f32,
    },

    /// 强度中值滤波 (不做二值化).
    MedianFilter {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 滤波窗口边长.
        #[serde(default = "three")]
        size: usize,
    },

    /// 图像图层 `>= thresh` 得到标注图层.
    Threshold {
        /// 输入图层.
        #[serde(default = "main_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
        /// 二值化阈值.
        #[serde(default = "default_thresh")]
        thresh: f32,
    },

    /// 标注图层只保留最大连通域.
    LargestCc {
        /// 输入标注图层.
        #[serde(default = "result_layer")]
        layer: String,
        /// 输出图层.
        #[serde(default = "result_layer")]
        out: String,
    },

    /// 复制图像图层.
    Copy {
        /// 源图像图层.
        from: String,
        /// 目标图像图层.
        to: String,
    },

    /// 什么都不做.
    Noop,
}

impl OpSpec {
    /// 操作名, 即配置中 `op` 字段的值.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Erode { .. } => "erode",
            Self::Dilate { .. } => "dilate",
            Self::Median { .. } => "median",
            Self::Invert { .. } => "invert",
            Self::Gamma { .. } => "gamma",
            Self::MedianFilter { .. } => "median_filter",
            Self::Threshold { .. } => "threshold",
            Self::LargestCc { .. } => "largest_cc",
            Self::Copy { .. } => "copy",
            Self::Noop => "noop",
        }
    }
}

impl PatchOp for OpSpec {
    #[inline]
    fn name(&self) -> &str {
        self.kind()
    }

    fn apply(self: Box<Self>, mut p: Patch) -> SurvosResult<Patch> {
        match *self {
            // 形态学操作自己会打印日志.
            Self::Erode {
                layer,
                out,
                num_iter,
                thresh,
            } => {
                let v = morph::erode(p.image(&layer)?.view(), num_iter, thresh);
                p.set_image(out, v);
            }
            Self::Dilate {
                layer,
                out,
                num_iter,
                thresh,
            } => {
                let v = morph::dilate(p.image(&layer)?.view(), num_iter, thresh);
                p.set_image(out, v);
            }
            Self::Median {
                layer,
                out,
                median_size,
                num_iter,
                thresh,
            } => {
                let v = morph::median(p.image(&layer)?.view(), median_size, num_iter, thresh)?;
                p.set_image(out, v);
            }
            Self::Invert { layer, out } => {
                info!("+ Computing invert");
                let v = filter::simple_invert(p.image(&layer)?.view());
                p.set_image(out, v);
            }
            Self::Gamma { layer, out, gamma } => {
                info!("+ Computing gamma");
                let v = filter::gamma_correct(p.image(&layer)?.view(), gamma)?;
                p.set_image(out, v);
            }
            Self::MedianFilter { layer, out, size } => {
                info!("+ Computing median_filter");
                let v = filter::median_filter(p.image(&layer)?.view(), size)?;
                p.set_image(out, v);
            }
            Self::Threshold { layer, out, thresh } => {
                info!("+ Computing threshold");
                let v = volume::to_label_vol(p.image(&layer)?.view(), thresh);
                p.set_annotation(out, v);
            }
            Self::LargestCc { layer, out } => {
                info!("+ Computing largest_cc");
                let v = volume::largest_cc(p.annotation(&layer)?.view());
                p.set_annotation(out, v);
            }
            Self::Copy { from, to } => {
                info!("+ Computing copy");
                let v = p.image(&from)?.clone();
                p.set_image(to, v);
            }
            Self::Noop => info!("+ Computing noop"),
        }
        Ok(p)
    }
}

/// 默认的掩膜流水线: 对 `Main` 做中值滤波得到 `total_mask`, 膨胀后写入 `result`.
pub fn mask_pipeline_specs() -> Vec<OpSpec> {
    vec![
        OpSpec::Median {
            layer: layer::MAIN.into(),
            out: layer::TOTAL_MASK.into(),
            median_size: 3,
            num_iter: 1,
            thresh: 0.5,
        },
        OpSpec::Dilate {
            layer: layer::TOTAL_MASK.into(),
            out: layer::TOTAL_MASK.into(),
            num_iter: 1,
            thresh: 0.5,
        },
        OpSpec::Copy {
            from: layer::TOTAL_MASK.into(),
            to: layer::RESULT.into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurvosError;
    use crate::pipeline::{Pipeline, PipelineParams};
    use crate::volume::Vol;
    use ndarray::s;

    fn blob() -> Patch {
        let mut v = Vol::zeros((9, 9, 9));
        v.slice_mut(s![2..7, 2..7, 2..7]).fill(1.0);
        // 孤立噪点.
        v[[0, 8, 8]] = 1.0;
        Patch::from_image(layer::MAIN, v)
    }

    #[test]
    fn test_op_spec_yaml() {
        let yaml = r#"
- op: median
  out: total_mask
  median_size: 3
- op: dilate
  layer: total_mask
  out: total_mask
- op: copy
  from: total_mask
  to: result
- op: noop
"#;
        let specs: Vec<OpSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs, mask_pipeline_specs().into_iter().chain([OpSpec::Noop]).collect::<Vec<_>>());
        assert_eq!(specs[0].kind(), "median");
    }

    #[test]
    fn test_op_spec_field_defaults() {
        let specs: Vec<OpSpec> = serde_yaml::from_str("- op: erode\n- op: largest_cc\n- op: median_filter\n").unwrap();
        assert_eq!(
            specs,
            vec![
                OpSpec::Erode {
                    layer: layer::MAIN.into(),
                    out: layer::RESULT.into(),
                    num_iter: 1,
                    thresh: 0.5,
                },
                OpSpec::LargestCc {
                    layer: layer::RESULT.into(),
                    out: layer::RESULT.into(),
                },
                OpSpec::MedianFilter {
                    layer: layer::MAIN.into(),
                    out: layer::RESULT.into(),
                    size: 3,
                },
            ]
        );
        assert!(serde_yaml::from_str::<OpSpec>("op: gamma\n").is_err());
        assert!(serde_yaml::from_str::<OpSpec>("op: copy\nfrom: a\n").is_err());
    }

    #[test]
    fn test_mask_pipeline() {
        let mut pl = Pipeline::new(PipelineParams::from_specs("mask", mask_pipeline_specs()));
        pl.init_payload(blob());
        let p = pl.run().unwrap();
        let res = p.image(layer::RESULT).unwrap();
        // 噪点被中值滤波去除.
        assert_eq!(res[[0, 8, 8]], 0.0);
        assert_eq!(res[[4, 4, 4]], 1.0);
        // 膨胀使前景变大.
        assert_eq!(res[[1, 4, 4]], 1.0);
        assert_eq!(res, p.image(layer::TOTAL_MASK).unwrap());
    }

    #[test]
    fn test_threshold_and_largest_cc() {
        let specs = vec![
            OpSpec::Threshold {
                layer: layer::MAIN.into(),
                out: layer::RESULT.into(),
                thresh: 0.5,
            },
            OpSpec::LargestCc {
                layer: layer::RESULT.into(),
                out: layer::RESULT.into(),
            },
        ];
        let mut pl = Pipeline::new(PipelineParams::from_specs("cc", specs));
        pl.init_payload(blob());
        let p = pl.run().unwrap();
        let cc = p.annotation(layer::RESULT).unwrap();
        assert_eq!(cc.sum(), 125);
        assert_eq!(cc[[0, 8, 8]], 0);
    }

    #[test]
    fn test_missing_layer_is_reported() {
        let specs = vec![OpSpec::Invert {
            layer: "nope".into(),
            out: layer::RESULT.into(),
        }];
        let mut pl = Pipeline::new(PipelineParams::from_specs("bad", specs));
        pl.init_payload(blob());
        match pl.run() {
            Err(SurvosError::Op(name, inner)) => {
                assert_eq!(name, "invert");
                assert!(matches!(*inner, SurvosError::MissingLayer(l) if l == "nope"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
