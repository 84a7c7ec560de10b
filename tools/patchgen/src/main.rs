//! 在 `.npy` 体数据上运行掩膜流水线, 采样 patch 并生成伪标签.
//!
//! 配置文件位置见 [`utils::loader::config_path_from_env_or_home`],
//! 输入目录见 [`utils::loader::data_dir_from_env_or_config`].

mod result;
mod runner;
mod stage;

use log::{error, info};
use simple_logger::SimpleLogger;
use std::process::ExitCode;
use utils::loader;

fn main() -> ExitCode {
    let cfg = match loader::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Loading config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = SimpleLogger::new()
        .with_level(cfg.scfg.logging.level_filter())
        .init()
    {
        eprintln!("Logger init error: {e}");
    }

    let data_dir = loader::data_dir_from_env_or_config(&cfg);
    info!("Running patch generation on {} with {} threads", data_dir.display(), utils::cpus());
    match runner::run(&cfg, &data_dir) {
        Ok(res) => {
            if let Err(e) = res.analyze() {
                error!("Writing report error: {e}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
