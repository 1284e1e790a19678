use std::sync::Arc;
use chrono::{NaiveDate, Utc};
use tracing::info;
use crate::core::error::ServiceError;
use crate::core::models::{Booking, BookingStatus, Bus, BusStatus, PaymentStatus, Route, TableRecord, User};
use crate::core::schema::DEFAULT_ID_FIELD;
use crate::core::storage::FlatRecordStore;
use crate::core::types::{now_timestamp, Record};

/// 订票请求
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub user_id: String,
    pub bus_id: String,
    pub seat_number: String,
    pub travel_date: String,
}

/// 订票与退票
pub struct BookingService {
    store: Arc<FlatRecordStore>,
}

impl BookingService {
    pub fn new(store: Arc<FlatRecordStore>) -> Self {
        BookingService { store }
    }

    /// 订一个座位
    ///
    /// 同一车次、同一出行日期、同一座位只能有一张有效（待确认或已确认）的票；
    /// 有效票数不能超过车辆容量。检查与写入在 bookings 表锁内完成。
    pub fn book(&self, request: &BookingRequest) -> Result<Booking, ServiceError> {
        let seat = request.seat_number.trim().to_ascii_uppercase();
        let travel_date = request.travel_date.trim();
        if seat.is_empty() {
            return Err(ServiceError::Validation("座位号不能为空".to_string()));
        }
        NaiveDate::parse_from_str(travel_date, "%Y-%m-%d")
            .map_err(|_| ServiceError::Validation(format!("出行日期格式错误: {}", travel_date)))?;

        if self.store.find_one(User::TABLE.name(), DEFAULT_ID_FIELD, &request.user_id)?.is_none() {
            return Err(ServiceError::not_found("user", &request.user_id));
        }
        let bus = self
            .store
            .find_typed::<Bus>(DEFAULT_ID_FIELD, &request.bus_id)?
            .ok_or_else(|| ServiceError::not_found("bus", &request.bus_id))?;
        if bus.status != BusStatus::Active {
            return Err(ServiceError::Validation(format!("车辆 {} 当前状态为 {}", bus.bus_number, bus.status)));
        }
        let route = self
            .store
            .find_typed::<Route>(DEFAULT_ID_FIELD, &bus.route_id)?
            .ok_or_else(|| ServiceError::not_found("route", &bus.route_id))?;

        let now = now_timestamp();
        let record = Record::new()
            .with("user_id", request.user_id.trim())
            .with("bus_id", bus.id.as_str())
            .with("route_id", route.id.as_str())
            .with("seat_number", seat.as_str())
            .with("booking_date", Utc::now().date_naive().to_string())
            .with("travel_date", travel_date)
            .with("fare", route.fare.to_string())
            .with("status", BookingStatus::Confirmed.as_str())
            .with("payment_status", PaymentStatus::Pending.as_str())
            .with("created_at", now.as_str())
            .with("updated_at", now.as_str());

        let id = self.store.insert_checked(Booking::TABLE.name(), DEFAULT_ID_FIELD, &record, |existing| {
            let active: Vec<&Record> = existing
                .iter()
                .filter(|r| r.matches("bus_id", &bus.id) && r.matches("travel_date", travel_date))
                .filter(|r| {
                    r.get("status")
                        .and_then(|s| s.parse::<BookingStatus>().ok())
                        .map_or(false, BookingStatus::holds_seat)
                })
                .collect();
            if active
                .iter()
                .any(|r| r.get("seat_number").map_or(false, |s| s.trim().eq_ignore_ascii_case(&seat)))
            {
                return Err(ServiceError::Duplicate(format!(
                    "车辆 {} 在 {} 的座位 {} 已被预订",
                    bus.id, travel_date, seat
                )));
            }
            if active.len() >= bus.capacity as usize {
                return Err(ServiceError::Validation(format!("车辆 {} 在 {} 已满", bus.id, travel_date)));
            }
            Ok(())
        })?;
        info!(booking_id = %id, bus_id = %bus.id, seat = %seat, "订票成功");

        self.get(&id)
    }

    pub fn get(&self, booking_id: &str) -> Result<Booking, ServiceError> {
        self.store
            .find_typed::<Booking>(DEFAULT_ID_FIELD, booking_id)?
            .ok_or_else(|| ServiceError::not_found("booking", booking_id))
    }

    /// 退票只改状态，不删除记录；已付款的同时标记为退款
    pub fn cancel(&self, booking_id: &str) -> Result<Booking, ServiceError> {
        let booking = self.get(booking_id)?;
        if !booking.status.holds_seat() {
            return Err(ServiceError::Validation(format!(
                "订单 {} 当前状态为 {}，不能取消",
                booking_id, booking.status
            )));
        }
        let mut patch = Record::new().with("status", BookingStatus::Cancelled.as_str());
        if booking.payment_status == PaymentStatus::Paid {
            patch.set("payment_status", PaymentStatus::Refunded.as_str());
        }
        self.store.update(Booking::TABLE.name(), DEFAULT_ID_FIELD, booking_id, &patch)?;
        info!(booking_id, "订单已取消");
        self.get(booking_id)
    }

    pub fn mark_paid(&self, booking_id: &str) -> Result<Booking, ServiceError> {
        let patch = Record::new().with("payment_status", PaymentStatus::Paid.as_str());
        if !self.store.update(Booking::TABLE.name(), DEFAULT_ID_FIELD, booking_id, &patch)? {
            return Err(ServiceError::not_found("booking", booking_id));
        }
        self.get(booking_id)
    }

    pub fn user_bookings(&self, user_id: &str) -> Result<Vec<Booking>, ServiceError> {
        Ok(self.store.find_all_typed::<Booking>("user_id", user_id)?)
    }

    /// 某车次某日的全部订单（包括已取消的）
    pub fn bus_bookings(&self, bus_id: &str, travel_date: &str) -> Result<Vec<Booking>, ServiceError> {
        Ok(self
            .store
            .find_all_typed::<Booking>("bus_id", bus_id)?
            .into_iter()
            .filter(|b| b.travel_date == travel_date.trim())
            .collect())
    }
}
