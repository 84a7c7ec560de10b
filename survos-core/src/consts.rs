//! 通用常量.

/// 标注体素值.
pub mod label {
    /// 标注中背景的体素值.
    pub const BACKGROUND: u32 = 0;

    /// 二值标注中前景的体素值.
    pub const FOREGROUND: u32 = 1;

    /// 随机生成的背景实体使用的类别码.
    pub const RANDOM_BACKGROUND_CLASS: u32 = 6;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(v: u32) -> bool {
        v == BACKGROUND
    }

    /// 体素是否是前景?
    #[inline]
    pub const fn is_foreground(v: u32) -> bool {
        !is_background(v)
    }
}

/// 各流水线操作之间约定俗成的图层名.
pub mod layer {
    /// 主图像.
    pub const MAIN: &str = "Main";

    /// 实体点集.
    pub const POINTS: &str = "Points";

    /// 所有伪标签之和的二值化结果.
    pub const TOTAL_MASK: &str = "total_mask";

    /// 流水线的最终输出.
    pub const RESULT: &str = "result";

    /// 主动轮廓 (ACWE) 精化结果.
    pub const ACWE: &str = "acwe";
}

/// `make_patches` 默认的填充 (同时也是 patch 大小).
pub const DEFAULT_PADDING: [usize; 3] = [64, 64, 64];

/// 可视化用真值掩膜中, 每个实体的包围盒大小.
pub const MASK_VOL_SIZE: [usize; 3] = [26, 26, 26];

/// `make_anno` 使用的伪标签核心区域半径.
pub const ANNO_CORE_MASK_RADIUS: [usize; 3] = [12, 12, 12];

/// 数据增强时随机偏移的尺度 (单位: 体素).
pub const AUG_OFFSET_SCALE: f64 = 32.0;

/// 训练/测试集划分使用的默认随机种子.
pub const SPLIT_SEED: u64 = 42;

/// `make_patches` 的测试集比例.
pub const PATCH_TEST_SIZE: f64 = 0.2;

/// `prepare_split` 的测试集比例.
pub const LOADER_TEST_SIZE: f64 = 0.1;

/// 生成随机背景实体时, 掩膜过滤前的候选个数.
pub const NUM_BEFORE_MASKING: usize = 60;
