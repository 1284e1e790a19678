use std::sync::Arc;
use crate::core::config::StoreConfig;
use crate::core::error::StoreError;
use crate::core::storage::FlatRecordStore;
use crate::service::{AuthService, BookingService, FleetService, SearchService, TrackingService};

// 错误显示模式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorDisplayMode {
    Brief,    // 简略错误信息
    Detailed, // 详细错误信息
}

/// 进程内唯一的存储实例及其配置
///
/// 启动时构造一次，各业务服务共享同一个 `Arc<FlatRecordStore>`，
/// 因而共享同一组表锁。
#[derive(Clone)]
pub struct Database {
    store: Arc<FlatRecordStore>,
    config: Arc<StoreConfig>,
}

impl Database {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let store = FlatRecordStore::open(config.data_dir())?;
        Ok(Database {
            store: Arc::new(store),
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &Arc<FlatRecordStore> {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.config.clone())
    }

    pub fn bookings(&self) -> BookingService {
        BookingService::new(self.store.clone())
    }

    pub fn fleet(&self) -> FleetService {
        FleetService::new(self.store.clone(), self.config.clone())
    }

    pub fn tracking(&self) -> TrackingService {
        TrackingService::new(self.store.clone(), self.config.clone())
    }

    pub fn search(&self) -> SearchService {
        SearchService::new(self.store.clone())
    }
}

impl ErrorDisplayMode {
    // 切换错误显示模式
    pub fn toggle(self) -> Self {
        match self {
            ErrorDisplayMode::Brief => ErrorDisplayMode::Detailed,
            ErrorDisplayMode::Detailed => ErrorDisplayMode::Brief,
        }
    }

    // 根据当前模式格式化错误信息
    pub fn format(self, error: &StoreError) -> String {
        match self {
            ErrorDisplayMode::Brief => error.brief_message(),
            ErrorDisplayMode::Detailed => error.detailed_message(),
        }
    }
}
