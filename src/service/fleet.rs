use std::sync::Arc;
use tracing::info;
use crate::core::config::StoreConfig;
use crate::core::error::ServiceError;
use crate::core::models::{Bus, BusStatus, Route, TableRecord, User, UserType};
use crate::core::schema::DEFAULT_ID_FIELD;
use crate::core::storage::FlatRecordStore;
use crate::core::types::{now_timestamp, Record};

/// 新车登记
#[derive(Debug, Clone)]
pub struct NewBus {
    pub bus_number: String,
    pub bus_name: String,
    pub route_id: String,
    pub driver_id: Option<String>,
    /// 缺省时使用配置中的默认座位数
    pub capacity: Option<u32>,
}

/// 车辆登记与状态维护
pub struct FleetService {
    store: Arc<FlatRecordStore>,
    config: Arc<StoreConfig>,
}

impl FleetService {
    pub fn new(store: Arc<FlatRecordStore>, config: Arc<StoreConfig>) -> Self {
        FleetService { store, config }
    }

    /// 登记一辆车，车牌号不区分大小写唯一
    ///
    /// 座位数必须在 1 到 `max_bus_capacity` 之间；指定司机时该账号必须是司机角色。
    pub fn add_bus(&self, new_bus: &NewBus) -> Result<Bus, ServiceError> {
        let bus_number = new_bus.bus_number.trim().to_string();
        if bus_number.is_empty() {
            return Err(ServiceError::Validation("车牌号不能为空".to_string()));
        }
        let capacity = new_bus.capacity.unwrap_or(self.config.default_bus_capacity);
        self.check_capacity(capacity)?;

        self.store
            .find_typed::<Route>(DEFAULT_ID_FIELD, &new_bus.route_id)?
            .ok_or_else(|| ServiceError::not_found("route", &new_bus.route_id))?;
        let driver_id = match new_bus.driver_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                let driver = self
                    .store
                    .find_typed::<User>(DEFAULT_ID_FIELD, id)?
                    .ok_or_else(|| ServiceError::not_found("user", id))?;
                if driver.user_type != UserType::Driver {
                    return Err(ServiceError::Validation(format!("用户 {} 不是司机", id)));
                }
                driver.id
            }
            _ => String::new(),
        };

        let now = now_timestamp();
        let record = Record::new()
            .with("bus_number", bus_number.as_str())
            .with("bus_name", new_bus.bus_name.trim())
            .with("driver_id", driver_id)
            .with("route_id", new_bus.route_id.trim())
            .with("capacity", capacity.to_string())
            .with("status", BusStatus::Active.as_str())
            .with("created_at", now.as_str())
            .with("updated_at", now.as_str());

        let id = self.store.insert_checked(Bus::TABLE.name(), DEFAULT_ID_FIELD, &record, |existing| {
            let taken = existing
                .iter()
                .filter_map(|r| r.get("bus_number"))
                .any(|n| n.trim().eq_ignore_ascii_case(&bus_number));
            if taken {
                return Err(ServiceError::Duplicate(format!("车牌号 {} 已登记", bus_number)));
            }
            Ok(())
        })?;
        info!(bus_id = %id, bus_number = %bus_number, capacity, "车辆已登记");

        self.bus(&id)
    }

    /// 调整座位数，同样受 `max_bus_capacity` 限制
    pub fn set_capacity(&self, bus_id: &str, capacity: u32) -> Result<Bus, ServiceError> {
        self.check_capacity(capacity)?;
        let patch = Record::new().with("capacity", capacity.to_string());
        if !self.store.update(Bus::TABLE.name(), DEFAULT_ID_FIELD, bus_id, &patch)? {
            return Err(ServiceError::not_found("bus", bus_id));
        }
        self.bus(bus_id)
    }

    pub fn set_status(&self, bus_id: &str, status: BusStatus) -> Result<Bus, ServiceError> {
        let patch = Record::new().with("status", status.as_str());
        if !self.store.update(Bus::TABLE.name(), DEFAULT_ID_FIELD, bus_id, &patch)? {
            return Err(ServiceError::not_found("bus", bus_id));
        }
        info!(bus_id, status = %status, "车辆状态已更新");
        self.bus(bus_id)
    }

    fn check_capacity(&self, capacity: u32) -> Result<(), ServiceError> {
        let max = self.config.max_bus_capacity;
        if capacity == 0 || capacity > max {
            return Err(ServiceError::Validation(format!(
                "座位数 {} 超出范围，应在 1 到 {} 之间",
                capacity, max
            )));
        }
        Ok(())
    }

    fn bus(&self, bus_id: &str) -> Result<Bus, ServiceError> {
        self.store
            .find_typed::<Bus>(DEFAULT_ID_FIELD, bus_id)?
            .ok_or_else(|| ServiceError::not_found("bus", bus_id))
    }
}
