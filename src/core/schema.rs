use std::fmt;
use std::str::FromStr;
use crate::core::error::StoreError;

/// 默认的标识列
pub const DEFAULT_ID_FIELD: &str = "id";

/// 修改时间列，update 时自动刷新
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// 系统内置的表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Buses,
    Routes,
    Bookings,
    Tracking,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Users,
        Table::Buses,
        Table::Routes,
        Table::Bookings,
        Table::Tracking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Buses => "buses",
            Table::Routes => "routes",
            Table::Bookings => "bookings",
            Table::Tracking => "tracking",
        }
    }

    /// 新建文件时的表头，顺序有意义
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Table::Users => &[
                "id", "username", "password", "email", "phone", "user_type",
                "full_name", "created_at", "updated_at", "is_active",
            ],
            Table::Buses => &[
                "id", "bus_number", "bus_name", "driver_id", "route_id", "capacity",
                "current_location_lat", "current_location_lng", "status",
                "created_at", "updated_at",
            ],
            Table::Routes => &[
                "id", "route_name", "source", "destination", "distance_km",
                "estimated_duration_min", "fare", "stops", "created_at", "updated_at",
            ],
            Table::Bookings => &[
                "id", "user_id", "bus_id", "route_id", "seat_number", "booking_date",
                "travel_date", "fare", "status", "payment_status", "created_at", "updated_at",
            ],
            Table::Tracking => &[
                "id", "bus_id", "latitude", "longitude", "speed", "direction",
                "timestamp", "driver_id", "route_id", "created_at",
            ],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| StoreError::Validation(format!("未知的表 {}", s)))
    }
}

/// 已知表的规范列；其他表返回 None，由第一条记录决定表头
pub fn canonical_fields(table: &str) -> Option<&'static [&'static str]> {
    table.parse::<Table>().ok().map(Table::fields)
}

/// 表名直接映射成文件名，只允许字母、数字和下划线
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    if table.is_empty() {
        return Err(StoreError::Validation("表名不能为空".to_string()));
    }
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Validation(format!("非法表名 {}", table)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_keyed_by_id() {
        for table in Table::ALL {
            assert_eq!(table.fields()[0], DEFAULT_ID_FIELD);
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
    }

    #[test]
    fn tracking_has_no_updated_at() {
        assert!(!Table::Tracking.fields().contains(&UPDATED_AT_FIELD));
        assert!(Table::Buses.fields().contains(&UPDATED_AT_FIELD));
    }

    #[test]
    fn table_names_cannot_escape_the_data_dir() {
        assert!(validate_table_name("bookings").is_ok());
        assert!(validate_table_name("drivers_2024").is_ok());
        assert!(validate_table_name("../etc/passwd").is_err());
        assert!(validate_table_name("").is_err());
        assert!(canonical_fields("unknown").is_none());
    }
}
