use std::path::{Path, PathBuf};
use clap::{Args, ValueEnum};

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    Development,
    Production,
    Testing,
}

/// 存储与业务参数
///
/// 同一个结构既作为命令行参数，也可以从环境变量读取。
#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    /// 数据目录；testing 环境下默认为 test_data
    #[arg(long, env = "TRANSIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 备份目录
    #[arg(long, env = "TRANSIT_BACKUP_DIR", default_value = "backups")]
    pub backup_dir: PathBuf,

    #[arg(long, env = "TRANSIT_PROFILE", value_enum, default_value_t = Profile::Development)]
    pub profile: Profile,

    #[arg(long, default_value_t = 30)]
    pub default_bus_capacity: u32,

    #[arg(long, default_value_t = 100)]
    pub max_bus_capacity: u32,

    #[arg(long, default_value_t = 6)]
    pub password_min_length: usize,

    #[arg(long, default_value_t = 3)]
    pub username_min_length: usize,

    /// 每辆车最多保留的定位记录数
    #[arg(long, default_value_t = 1000)]
    pub max_tracking_records_per_bus: usize,
}

impl StoreConfig {
    /// 以默认参数使用指定数据目录，备份放在其下的 backups
    pub fn for_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        StoreConfig {
            backup_dir: data_dir.join("backups"),
            data_dir: Some(data_dir),
            ..StoreConfig::default()
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        match (&self.data_dir, self.profile) {
            (Some(dir), _) => dir.clone(),
            (None, Profile::Testing) => PathBuf::from("test_data"),
            (None, _) => PathBuf::from("data"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: None,
            backup_dir: PathBuf::from("backups"),
            profile: Profile::Development,
            default_bus_capacity: 30,
            max_bus_capacity: 100,
            password_min_length: 6,
            username_min_length: 3,
            max_tracking_records_per_bus: 1000,
        }
    }
}
