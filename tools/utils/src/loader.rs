//! 对 `survos-core` 的更一层封装. 提供配置与输入数据的加载.

use ndarray::{Array2, Array3};
use ndarray_npy::read_npy;
use std::env;
use std::path::{Path, PathBuf};
use survos_core::config::{self, AppConfig};
use survos_core::entity::EntityPoint;
use survos_core::{SurvosError, SurvosResult};

/// 获取配置文件路径.
///
/// 1. 若环境变量 `$SURVOS_CONFIG` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/.survos/config.yaml`.
pub fn config_path_from_env_or_home() -> Option<PathBuf> {
    match env::var("SURVOS_CONFIG") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => config::user_config_path(),
    }
}

/// 加载配置. 配置文件不存在时使用内置默认配置.
pub fn load_config() -> SurvosResult<AppConfig> {
    match config_path_from_env_or_home() {
        Some(p) if p.is_file() => AppConfig::load(p),
        _ => Ok(AppConfig::default()),
    }
}

/// 获取输入数据目录.
///
/// 1. 若环境变量 `$SURVOS_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回配置中的 `loading_cfg.sdata_rootpath`.
pub fn data_dir_from_env_or_config(cfg: &AppConfig) -> PathBuf {
    match env::var("SURVOS_DATA_DIR") {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => cfg.loading_cfg.sdata_rootpath.clone(),
    }
}

/// 读取 `.npy` 格式的 `f32` 体数据.
pub fn load_volume<P: AsRef<Path>>(path: P) -> SurvosResult<Array3<f32>> {
    Ok(read_npy(path)?)
}

/// 读取 `.npy` 格式的实体点. 数组形状须为 `(n, 4)`, 每行为 `(z, x, y, class_code)`.
pub fn load_points<P: AsRef<Path>>(path: P) -> SurvosResult<Vec<EntityPoint>> {
    let arr: Array2<f64> = read_npy(path)?;
    if arr.ncols() != 4 {
        return Err(SurvosError::invalid(format!(
            "实体点数组须为 (n, 4), 实际为 {:?}",
            arr.dim()
        )));
    }
    Ok(arr
        .rows()
        .into_iter()
        .map(|r| EntityPoint::from([r[0], r[1], r[2], r[3]]))
        .collect())
}
