use std::collections::HashSet;
use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, info};
use crate::core::config::StoreConfig;
use crate::core::error::ServiceError;
use crate::core::models::{Bus, TableRecord, TrackingPoint};
use crate::core::schema::DEFAULT_ID_FIELD;
use crate::core::storage::FlatRecordStore;
use crate::core::types::{now_timestamp, parse_timestamp, Record, TIMESTAMP_FORMAT};

/// 暂无实时路况，到站时间固定给出 15 分钟
pub const DEFAULT_ETA_MINUTES: u32 = 15;

/// 司机上报的一次定位
#[derive(Debug, Clone)]
pub struct PositionUpdate {
    pub bus_id: String,
    pub driver_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub direction: f64,
    /// 缺省时使用当前时间
    pub timestamp: Option<String>,
}

/// 一辆车的轨迹
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSummary {
    pub route: Vec<TrackingPoint>,
    pub latest_position: TrackingPoint,
    pub eta: u32,
}

pub struct TrackingService {
    store: Arc<FlatRecordStore>,
    config: Arc<StoreConfig>,
}

impl TrackingService {
    pub fn new(store: Arc<FlatRecordStore>, config: Arc<StoreConfig>) -> Self {
        TrackingService { store, config }
    }

    /// 记录一次定位，并把最新位置同步到车辆记录上
    pub fn record_position(&self, update: &PositionUpdate) -> Result<TrackingPoint, ServiceError> {
        if !(-90.0..=90.0).contains(&update.latitude) || !(-180.0..=180.0).contains(&update.longitude) {
            return Err(ServiceError::Validation(format!(
                "坐标越界: ({}, {})",
                update.latitude, update.longitude
            )));
        }
        // 统一成可按字典序比较的格式
        let timestamp = match &update.timestamp {
            Some(ts) => parse_timestamp(ts)
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .ok_or_else(|| ServiceError::Validation(format!("时间戳格式错误: {}", ts)))?,
            None => now_timestamp(),
        };
        let bus = self
            .store
            .find_typed::<Bus>(DEFAULT_ID_FIELD, &update.bus_id)?
            .ok_or_else(|| ServiceError::not_found("bus", &update.bus_id))?;

        let record = Record::new()
            .with("bus_id", bus.id.as_str())
            .with("latitude", update.latitude.to_string())
            .with("longitude", update.longitude.to_string())
            .with("speed", update.speed.to_string())
            .with("direction", update.direction.to_string())
            .with("timestamp", timestamp.as_str())
            .with("driver_id", update.driver_id.as_deref().unwrap_or(&bus.driver_id))
            .with("route_id", bus.route_id.as_str())
            .with("created_at", now_timestamp());
        let id = self.store.insert(TrackingPoint::TABLE.name(), DEFAULT_ID_FIELD, &record)?;

        self.mirror_latest(&bus.id)?;
        debug!(bus_id = %bus.id, tracking_id = %id, "定位已记录");

        self.prune(&bus.id, self.config.max_tracking_records_per_bus)?;

        self.store
            .find_typed::<TrackingPoint>(DEFAULT_ID_FIELD, &id)?
            .ok_or_else(|| ServiceError::not_found("tracking", &id))
    }

    // 在车辆表锁内读取最新定位再写回，
    // 并发上报时最后持锁的一方一定能看到双方的定位，旧位置不会覆盖新位置
    fn mirror_latest(&self, bus_id: &str) -> Result<bool, ServiceError> {
        let mirror = |row: &Record| -> Result<Option<Record>, ServiceError> {
            let Some(latest) = self.latest(bus_id)? else {
                return Ok(None);
            };
            let lat = latest.latitude.to_string();
            let lng = latest.longitude.to_string();
            if row.matches("current_location_lat", &lat) && row.matches("current_location_lng", &lng) {
                return Ok(None);
            }
            Ok(Some(
                Record::new()
                    .with("current_location_lat", lat)
                    .with("current_location_lng", lng),
            ))
        };
        self.store.update_with(Bus::TABLE.name(), DEFAULT_ID_FIELD, bus_id, mirror)
    }

    /// 时间戳最大的定位；相同时间戳取文件中靠后的一条
    pub fn latest(&self, bus_id: &str) -> Result<Option<TrackingPoint>, ServiceError> {
        Ok(self
            .points(bus_id)?
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp)))
    }

    /// 按时间排序的完整轨迹；没有任何定位时返回 None
    pub fn history(&self, bus_id: &str) -> Result<Option<TrackingSummary>, ServiceError> {
        let mut route = self.points(bus_id)?;
        route.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(route.last().cloned().map(|latest_position| TrackingSummary {
            route,
            latest_position,
            eta: DEFAULT_ETA_MINUTES,
        }))
    }

    /// 每辆车只保留最新的 keep 条定位，返回删除条数
    pub fn prune(&self, bus_id: &str, keep: usize) -> Result<usize, ServiceError> {
        let mut points = self.points(bus_id)?;
        if points.len() <= keep {
            return Ok(0);
        }
        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let stale: HashSet<String> = points[..points.len() - keep]
            .iter()
            .map(|p| p.id.clone())
            .collect();
        let removed = self.store.retain(TrackingPoint::TABLE.name(), |r| {
            !(r.matches("bus_id", bus_id) && r.get(DEFAULT_ID_FIELD).map_or(false, |id| stale.contains(id.trim())))
        })?;
        info!(bus_id, removed, "清理过期定位");
        Ok(removed)
    }

    fn points(&self, bus_id: &str) -> Result<Vec<TrackingPoint>, ServiceError> {
        Ok(self.store.find_all_typed::<TrackingPoint>("bus_id", bus_id)?)
    }
}
