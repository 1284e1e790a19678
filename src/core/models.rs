//! 每张表的类型化记录，以及记录与字符串行之间的转换。
//!
//! 枚举字段在构造时校验，读取处不再处理任意字符串。

use std::fmt;
use std::str::FromStr;
use serde::Serialize;
use crate::core::error::StoreError;
use crate::core::schema::Table;
use crate::core::types::{format_flag, parse_flag, Record};

/// 类型化记录与表中一行之间的转换
pub trait TableRecord: Sized {
    const TABLE: Table;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, StoreError>;
}

// 定义以小写字符串持久化的封闭枚举
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("{} 不是合法的 {}", other, stringify!($name))),
                }
            }
        }
    };
}

string_enum!(
    /// 账号角色
    UserType { User => "user", Driver => "driver", Admin => "admin" }
);

string_enum!(BusStatus { Active => "active", Inactive => "inactive", Maintenance => "maintenance" });

string_enum!(BookingStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
});

string_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

impl BookingStatus {
    /// 占用座位的状态
    pub fn holds_seat(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

// 从一行中按列名取值并解析
struct Fields<'a> {
    table: Table,
    record: &'a Record,
}

impl<'a> Fields<'a> {
    fn new(table: Table, record: &'a Record) -> Self {
        Fields { table, record }
    }

    fn text(&self, name: &str) -> String {
        self.record.get(name).unwrap_or("").trim().to_string()
    }

    fn required(&self, name: &str) -> Result<String, StoreError> {
        let value = self.text(name);
        if value.is_empty() {
            return Err(StoreError::field(self.table.name(), name, "不能为空"));
        }
        Ok(value)
    }

    fn parse<T>(&self, name: &str) -> Result<T, StoreError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.required(name)?
            .parse()
            .map_err(|e: T::Err| StoreError::field(self.table.name(), name, e.to_string()))
    }

    fn optional<T>(&self, name: &str) -> Result<Option<T>, StoreError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if self.text(name).is_empty() {
            Ok(None)
        } else {
            self.parse(name).map(Some)
        }
    }

    fn flag(&self, name: &str) -> Result<bool, StoreError> {
        let value = self.text(name);
        parse_flag(&value)
            .ok_or_else(|| StoreError::field(self.table.name(), name, format!("{} 不是布尔值", value)))
    }
}

fn optional_text<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// 加盐摘要，永远不会序列化输出
    #[serde(skip_serializing)]
    pub password: String,
    pub email: String,
    pub phone: String,
    pub user_type: UserType,
    pub full_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

impl TableRecord for User {
    const TABLE: Table = Table::Users;

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("username", self.username.as_str())
            .with("password", self.password.as_str())
            .with("email", self.email.as_str())
            .with("phone", self.phone.as_str())
            .with("user_type", self.user_type.as_str())
            .with("full_name", self.full_name.as_str())
            .with("created_at", self.created_at.as_str())
            .with("updated_at", self.updated_at.as_str())
            .with("is_active", format_flag(self.is_active))
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let f = Fields::new(Self::TABLE, record);
        Ok(User {
            id: f.required("id")?,
            username: f.text("username"),
            password: f.text("password"),
            email: f.required("email")?,
            phone: f.text("phone"),
            user_type: f.parse("user_type")?,
            full_name: f.text("full_name"),
            created_at: f.text("created_at"),
            updated_at: f.text("updated_at"),
            // 旧数据没有该列时视为启用
            is_active: if f.text("is_active").is_empty() { true } else { f.flag("is_active")? },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bus {
    pub id: String,
    pub bus_number: String,
    pub bus_name: String,
    pub driver_id: String,
    pub route_id: String,
    pub capacity: u32,
    pub current_location_lat: Option<f64>,
    pub current_location_lng: Option<f64>,
    pub status: BusStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl TableRecord for Bus {
    const TABLE: Table = Table::Buses;

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("bus_number", self.bus_number.as_str())
            .with("bus_name", self.bus_name.as_str())
            .with("driver_id", self.driver_id.as_str())
            .with("route_id", self.route_id.as_str())
            .with("capacity", self.capacity.to_string())
            .with("current_location_lat", optional_text(&self.current_location_lat))
            .with("current_location_lng", optional_text(&self.current_location_lng))
            .with("status", self.status.as_str())
            .with("created_at", self.created_at.as_str())
            .with("updated_at", self.updated_at.as_str())
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let f = Fields::new(Self::TABLE, record);
        Ok(Bus {
            id: f.required("id")?,
            bus_number: f.text("bus_number"),
            bus_name: f.text("bus_name"),
            driver_id: f.text("driver_id"),
            route_id: f.text("route_id"),
            capacity: f.parse("capacity")?,
            current_location_lat: f.optional("current_location_lat")?,
            current_location_lng: f.optional("current_location_lng")?,
            status: f.parse("status")?,
            created_at: f.text("created_at"),
            updated_at: f.text("updated_at"),
        })
    }
}

/// 站点列表在文件中以分号分隔
pub const STOP_SEPARATOR: &str = ";";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub id: String,
    pub route_name: String,
    pub source: String,
    pub destination: String,
    pub distance_km: Option<f64>,
    pub estimated_duration_min: Option<u32>,
    pub fare: f64,
    pub stops: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TableRecord for Route {
    const TABLE: Table = Table::Routes;

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("route_name", self.route_name.as_str())
            .with("source", self.source.as_str())
            .with("destination", self.destination.as_str())
            .with("distance_km", optional_text(&self.distance_km))
            .with("estimated_duration_min", optional_text(&self.estimated_duration_min))
            .with("fare", self.fare.to_string())
            .with("stops", self.stops.join(STOP_SEPARATOR))
            .with("created_at", self.created_at.as_str())
            .with("updated_at", self.updated_at.as_str())
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let f = Fields::new(Self::TABLE, record);
        Ok(Route {
            id: f.required("id")?,
            route_name: f.text("route_name"),
            source: f.required("source")?,
            destination: f.required("destination")?,
            distance_km: f.optional("distance_km")?,
            estimated_duration_min: f.optional("estimated_duration_min")?,
            fare: f.parse("fare")?,
            stops: f
                .text("stops")
                .split(STOP_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            created_at: f.text("created_at"),
            updated_at: f.text("updated_at"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub bus_id: String,
    pub route_id: String,
    pub seat_number: String,
    pub booking_date: String,
    pub travel_date: String,
    pub fare: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl TableRecord for Booking {
    const TABLE: Table = Table::Bookings;

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("user_id", self.user_id.as_str())
            .with("bus_id", self.bus_id.as_str())
            .with("route_id", self.route_id.as_str())
            .with("seat_number", self.seat_number.as_str())
            .with("booking_date", self.booking_date.as_str())
            .with("travel_date", self.travel_date.as_str())
            .with("fare", self.fare.to_string())
            .with("status", self.status.as_str())
            .with("payment_status", self.payment_status.as_str())
            .with("created_at", self.created_at.as_str())
            .with("updated_at", self.updated_at.as_str())
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let f = Fields::new(Self::TABLE, record);
        Ok(Booking {
            id: f.required("id")?,
            user_id: f.required("user_id")?,
            bus_id: f.required("bus_id")?,
            route_id: f.text("route_id"),
            seat_number: f.required("seat_number")?,
            booking_date: f.text("booking_date"),
            travel_date: f.required("travel_date")?,
            fare: f.optional("fare")?.unwrap_or(0.0),
            status: f.parse("status")?,
            payment_status: f.optional("payment_status")?.unwrap_or(PaymentStatus::Pending),
            created_at: f.text("created_at"),
            updated_at: f.text("updated_at"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingPoint {
    pub id: String,
    pub bus_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub direction: f64,
    pub timestamp: String,
    pub driver_id: String,
    pub route_id: String,
    pub created_at: String,
}

impl TableRecord for TrackingPoint {
    const TABLE: Table = Table::Tracking;

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("bus_id", self.bus_id.as_str())
            .with("latitude", self.latitude.to_string())
            .with("longitude", self.longitude.to_string())
            .with("speed", self.speed.to_string())
            .with("direction", self.direction.to_string())
            .with("timestamp", self.timestamp.as_str())
            .with("driver_id", self.driver_id.as_str())
            .with("route_id", self.route_id.as_str())
            .with("created_at", self.created_at.as_str())
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let f = Fields::new(Self::TABLE, record);
        Ok(TrackingPoint {
            id: f.required("id")?,
            bus_id: f.required("bus_id")?,
            latitude: f.parse("latitude")?,
            longitude: f.parse("longitude")?,
            speed: f.optional("speed")?.unwrap_or(0.0),
            direction: f.optional("direction")?.unwrap_or(0.0),
            timestamp: f.required("timestamp")?,
            driver_id: f.text("driver_id"),
            route_id: f.text("route_id"),
            created_at: f.text("created_at"),
        })
    }
}
