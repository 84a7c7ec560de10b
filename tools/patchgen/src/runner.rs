//! 程序运行函数.

use crate::result::RunResult;
use crate::stage::timed;
use ndarray_npy::write_npy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use survos_core::config::AppConfig;
use survos_core::consts::layer;
use survos_core::entity::anno::generate_annotation_volume;
use survos_core::entity::patches::dt_string;
use survos_core::entity::{init_entity_workflow, make_patches};
use survos_core::pipeline::{Patch, Pipeline, PipelineParams};
use survos_core::{SurvosError, SurvosResult};
use utils::loader;

/// 输入目录下的主体数据文件名.
pub const MAIN_VOLUME: &str = "main.npy";

/// 输入目录下的实体点文件名.
pub const ENTITIES: &str = "entities.npy";

/// 输入目录下的金标准实体点文件名. 可以不存在.
pub const GOLD_ENTITIES: &str = "gold.npy";

/// 实际运行.
///
/// 1. 从 `data_dir` 读取主体数据与实体点, 初始化实体工作流;
/// 2. 对主体数据运行配置中的掩膜流水线, 得到 `result` 图层作为 proposal;
/// 3. 采样 patch 并保存到 `outdir`;
/// 4. 生成伪标签并保存到 `outdir`.
pub fn run(cfg: &AppConfig, data_dir: &Path) -> SurvosResult<RunResult> {
    let mut result = RunResult::new();
    let ent = &cfg.entity_cfg;
    let outdir = ent.workflow.outdir.as_path();
    fs::create_dir_all(outdir)?;

    let (mut wf, load) = timed("load", || {
        let img = loader::load_volume(data_dir.join(MAIN_VOLUME))?;
        let pts = loader::load_points(data_dir.join(ENTITIES))?;
        let gold_path = data_dir.join(GOLD_ENTITIES);
        let gold = if gold_path.is_file() {
            loader::load_points(gold_path)?
        } else {
            Vec::new()
        };
        let wf = init_entity_workflow(img.view(), &pts, &gold, ent.workflow.clone())?;
        let n = wf.locs.len();
        SurvosResult::Ok((wf, n))
    })?;
    result.push_stage(load);

    let (proposal, pipe) = timed("pipeline", || {
        let params = PipelineParams::from_specs("mask", cfg.pipeline.iter().cloned());
        let n = cfg.pipeline.len();
        let mut p = Pipeline::new(params);
        let vol = wf.vols.get(ent.patch.vol_num).ok_or_else(|| {
            SurvosError::invalid(format!("vol_num {} 越界", ent.patch.vol_num))
        })?;
        p.init_payload(Patch::from_image(layer::MAIN, vol.clone()));
        let mut out = p.run()?;
        SurvosResult::Ok((out.take_image(layer::RESULT)?, n))
    })?;
    result.push_stage(pipe);

    let mut rng = StdRng::seed_from_u64(cfg.scfg.random_seed_main);
    let stamp = dt_string();
    let proj = ent.workflow.proj.as_str();

    let ((saved, meta_path), patches) = timed("patches", || {
        let set = make_patches(&wf, &wf.locs, proposal.view(), &ent.patch, &mut rng)?;
        let saved = set.save_npz(outdir, proj, &stamp)?;
        let meta_path = outdir.join(format!("{proj}_patch_meta_{stamp}.bin"));
        set.meta().save(&meta_path)?;
        SurvosResult::Ok(((saved, meta_path), set.len()))
    })?;
    result.push_stage(patches);
    for p in [saved.img_vols, saved.label_vols, saved.mask_gt, meta_path] {
        result.push_output(p);
    }

    let (anno_path, anno) = timed("anno", || {
        let meta = wf.params.entity_meta.clone();
        let av = generate_annotation_volume(&mut wf, meta, &ent.anno, None, &mut rng)?;
        let path = outdir.join(format!("{proj}_anno_gen_{stamp}.npy"));
        write_npy(&path, &av.masks.anno_gen)?;
        SurvosResult::Ok((path, av.gt_entities.len()))
    })?;
    result.push_stage(anno);
    result.push_output(anno_path);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use survos_core::volume::RoiBox;

    #[test]
    fn test_run_on_synthetic_volume() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();

        let vol = Array3::from_shape_fn((30, 30, 30), |(z, x, y)| ((z + x + y) % 7) as f32 / 7.0);
        write_npy(data_dir.join(MAIN_VOLUME), &vol).unwrap();
        write_npy(
            data_dir.join(ENTITIES),
            &array![[15.0, 15.0, 15.0, 0.0], [10.0, 12.0, 14.0, 1.0], [18.0, 16.0, 12.0, 1.0]],
        )
        .unwrap();

        let mut cfg = AppConfig::default();
        cfg.entity_cfg.workflow.main_bv = RoiBox::from([0, 30, 0, 30, 0, 30]);
        cfg.entity_cfg.workflow.outdir = root.path().join("out");
        cfg.entity_cfg.patch.padding = [8, 8, 8];
        cfg.entity_cfg.patch.num_augs = 1;
        cfg.entity_cfg.anno.padding = [8, 8, 8];

        let res = run(&cfg, &data_dir).unwrap();
        let mut buf = Vec::new();
        res.analyze_into(&mut buf).unwrap();
        let report = String::from_utf8(buf).unwrap();
        for stage in ["load", "pipeline", "patches", "anno"] {
            assert!(report.contains(&format!("Stage `{stage}`")));
        }
        assert_eq!(report.matches("Saved ").count(), 5);
        assert_eq!(fs::read_dir(root.path().join("out")).unwrap().count(), 5);
    }
}
