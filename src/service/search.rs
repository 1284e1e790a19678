use std::collections::HashMap;
use std::sync::Arc;
use serde::Serialize;
use crate::core::error::ServiceError;
use crate::core::models::{Bus, Route};
use crate::core::schema::DEFAULT_ID_FIELD;
use crate::core::storage::FlatRecordStore;

/// 查询结果：车辆加上所属线路的名称、起终点和票价
#[derive(Debug, Clone, Serialize)]
pub struct BusSearchResult {
    #[serde(flatten)]
    pub bus: Bus,
    pub route_name: String,
    pub source: String,
    pub destination: String,
    pub fare: f64,
}

/// 线路与车辆查询
///
/// 两张表都是几百行的规模，每次整表读入后在内存中按 route_id 关联。
pub struct SearchService {
    store: Arc<FlatRecordStore>,
}

impl SearchService {
    pub fn new(store: Arc<FlatRecordStore>) -> Self {
        SearchService { store }
    }

    /// 起终点匹配的所有车辆，忽略大小写和首尾空白
    pub fn search(&self, source: &str, destination: &str) -> Result<Vec<BusSearchResult>, ServiceError> {
        let source = source.trim();
        let destination = destination.trim();
        if source.is_empty() || destination.is_empty() {
            return Err(ServiceError::Validation("起点和终点不能为空".to_string()));
        }

        let routes: HashMap<String, Route> = self
            .store
            .read_typed::<Route>()?
            .into_iter()
            .filter(|r| r.source.eq_ignore_ascii_case(source) && r.destination.eq_ignore_ascii_case(destination))
            .map(|r| (r.id.clone(), r))
            .collect();
        if routes.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .store
            .read_typed::<Bus>()?
            .into_iter()
            .filter_map(|bus| {
                let route = routes.get(&bus.route_id)?;
                Some(BusSearchResult {
                    route_name: route.route_name.clone(),
                    source: route.source.clone(),
                    destination: route.destination.clone(),
                    fare: route.fare,
                    bus,
                })
            })
            .collect())
    }

    pub fn routes(&self) -> Result<Vec<Route>, ServiceError> {
        Ok(self.store.read_typed::<Route>()?)
    }

    pub fn route(&self, route_id: &str) -> Result<Route, ServiceError> {
        self.store
            .find_typed::<Route>(DEFAULT_ID_FIELD, route_id)?
            .ok_or_else(|| ServiceError::not_found("route", route_id))
    }

    pub fn buses(&self) -> Result<Vec<Bus>, ServiceError> {
        Ok(self.store.read_typed::<Bus>()?)
    }

    pub fn bus(&self, bus_id: &str) -> Result<Bus, ServiceError> {
        self.store
            .find_typed::<Bus>(DEFAULT_ID_FIELD, bus_id)?
            .ok_or_else(|| ServiceError::not_found("bus", bus_id))
    }

    pub fn bus_by_number(&self, bus_number: &str) -> Result<Bus, ServiceError> {
        self.store
            .find_typed::<Bus>("bus_number", bus_number)?
            .ok_or_else(|| ServiceError::not_found("bus", bus_number))
    }
}
