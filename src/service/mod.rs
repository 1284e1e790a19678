//! 存储之上的业务服务：登录、订票、车辆登记、定位和查询。

pub mod auth;
pub mod booking;
pub mod fleet;
pub mod search;
pub mod tracking;

pub use auth::{AuthService, Registration};
pub use booking::{BookingRequest, BookingService};
pub use fleet::{FleetService, NewBus};
pub use search::{BusSearchResult, SearchService};
pub use tracking::{PositionUpdate, TrackingService, TrackingSummary};
