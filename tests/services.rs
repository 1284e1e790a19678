//! 业务服务在真实数据目录上的测试。

use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;
use transit_store::core::models::{BookingStatus, BusStatus, UserType};
use transit_store::core::schema::Table;
use transit_store::service::auth::hash_password;
use transit_store::service::{BookingRequest, NewBus, PositionUpdate, Registration};
use transit_store::{Database, Record, ServiceError, StoreConfig};

fn open_db() -> (TempDir, Database) {
    transit_store::logging::init();
    let dir = TempDir::new().unwrap();
    let db = Database::open(StoreConfig::for_dir(dir.path().join("data"))).unwrap();
    (dir, db)
}

// 线路 2、车辆 7、用户 1
fn seed_fleet(db: &Database, capacity: u32) {
    let store = db.store();
    store
        .append(
            Table::Routes.name(),
            &Record::new()
                .with("id", "2")
                .with("route_name", "Pune - Mumbai Express")
                .with("source", "Pune")
                .with("destination", "Mumbai")
                .with("fare", "300"),
        )
        .unwrap();
    store
        .append(
            Table::Buses.name(),
            &Record::new()
                .with("id", "7")
                .with("bus_number", "MH-12-AB-4321")
                .with("bus_name", "Shivneri")
                .with("driver_id", "5")
                .with("route_id", "2")
                .with("capacity", capacity.to_string())
                .with("status", "active"),
        )
        .unwrap();
    store
        .append(
            Table::Users.name(),
            &Record::new()
                .with("id", "1")
                .with("username", "rider")
                .with("email", "rider@transit.in")
                .with("user_type", "user")
                .with("is_active", "True"),
        )
        .unwrap();
}

fn request(seat: &str) -> BookingRequest {
    BookingRequest {
        user_id: "1".to_string(),
        bus_id: "7".to_string(),
        seat_number: seat.to_string(),
        travel_date: "2024-06-01".to_string(),
    }
}

fn registration(email: &str, user_type: UserType) -> Registration {
    Registration {
        username: "ravi".to_string(),
        email: email.to_string(),
        password: "s3cret-pass".to_string(),
        phone: "9800000001".to_string(),
        full_name: "Ravi Kumar".to_string(),
        user_type,
    }
}

#[test]
fn same_seat_same_day_is_rejected_as_duplicate() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    db.store()
        .append(
            Table::Bookings.name(),
            &Record::new()
                .with("id", "1")
                .with("user_id", "1")
                .with("bus_id", "7")
                .with("route_id", "2")
                .with("seat_number", "12A")
                .with("travel_date", "2024-06-01")
                .with("fare", "300")
                .with("status", "confirmed"),
        )
        .unwrap();

    let err = db.bookings().book(&request("12A")).unwrap_err();
    assert!(matches!(err, ServiceError::Duplicate(_)), "{:?}", err);
    // 座位号大小写不同也算同一个座位
    assert!(matches!(db.bookings().book(&request("12a")), Err(ServiceError::Duplicate(_))));

    let other_seat = db.bookings().book(&request("12B")).unwrap();
    assert_eq!(other_seat.id, "2");
    assert_eq!(other_seat.fare, 300.0);

    let other_day = db
        .bookings()
        .book(&BookingRequest {
            travel_date: "2024-06-02".to_string(),
            ..request("12A")
        })
        .unwrap();
    assert_eq!(other_day.status, BookingStatus::Confirmed);
}

#[test]
fn cancelled_seat_can_be_booked_again() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let bookings = db.bookings();

    let first = bookings.book(&request("3C")).unwrap();
    let cancelled = bookings.cancel(&first.id).unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(matches!(bookings.cancel(&first.id), Err(ServiceError::Validation(_))));

    let again = bookings.book(&request("3C")).unwrap();
    assert_ne!(again.id, first.id);
    assert_eq!(bookings.bus_bookings("7", "2024-06-01").unwrap().len(), 2);
    assert_eq!(bookings.user_bookings("1").unwrap().len(), 2);
}

#[test]
fn full_bus_rejects_new_bookings() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 2);
    let bookings = db.bookings();
    bookings.book(&request("1A")).unwrap();
    bookings.book(&request("1B")).unwrap();
    assert!(matches!(bookings.book(&request("1C")), Err(ServiceError::Validation(_))));
}

#[test]
fn booking_requires_existing_user_and_bus() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let bookings = db.bookings();

    let unknown_bus = BookingRequest { bus_id: "99".to_string(), ..request("1A") };
    assert!(matches!(bookings.book(&unknown_bus), Err(ServiceError::NotFound { entity: "bus", .. })));

    let unknown_user = BookingRequest { user_id: "99".to_string(), ..request("1A") };
    assert!(matches!(bookings.book(&unknown_user), Err(ServiceError::NotFound { entity: "user", .. })));

    let bad_date = BookingRequest { travel_date: "01/06/2024".to_string(), ..request("1A") };
    assert!(matches!(bookings.book(&bad_date), Err(ServiceError::Validation(_))));
}

#[test]
fn paid_booking_is_refunded_on_cancel() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let bookings = db.bookings();
    let booking = bookings.book(&request("5D")).unwrap();
    bookings.mark_paid(&booking.id).unwrap();
    let cancelled = bookings.cancel(&booking.id).unwrap();
    assert_eq!(cancelled.payment_status.as_str(), "refunded");
}

#[test]
fn register_then_login() {
    let (_dir, db) = open_db();
    let auth = db.auth();
    let user = auth.register(&registration("Ravi@Transit.in", UserType::Driver)).unwrap();
    assert_eq!(user.email, "ravi@transit.in");
    assert!(user.password.starts_with("sha256$"));

    let logged_in = auth.login(" ravi@transit.in ", "s3cret-pass", UserType::Driver).unwrap();
    assert_eq!(logged_in.id, user.id);

    assert!(matches!(
        auth.login("ravi@transit.in", "wrong-pass", UserType::Driver),
        Err(ServiceError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.login("ravi@transit.in", "s3cret-pass", UserType::Admin),
        Err(ServiceError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.register(&registration("ravi@transit.in", UserType::User)),
        Err(ServiceError::Duplicate(_))
    ));
}

#[test]
fn registration_rules() {
    let (_dir, db) = open_db();
    let auth = db.auth();
    let short_name = Registration { username: "ab".to_string(), ..registration("a@b.in", UserType::User) };
    assert!(matches!(auth.register(&short_name), Err(ServiceError::Validation(_))));

    let short_password = Registration { password: "12345".to_string(), ..registration("a@b.in", UserType::User) };
    assert!(matches!(auth.register(&short_password), Err(ServiceError::Validation(_))));

    assert!(matches!(
        auth.register(&registration("not-an-email", UserType::User)),
        Err(ServiceError::Validation(_))
    ));
    assert!(db.store().read_all(Table::Users.name()).unwrap().is_empty());
}

#[test]
fn plaintext_passwords_are_refused_until_reset() {
    let (_dir, db) = open_db();
    db.store()
        .append(
            Table::Users.name(),
            &Record::new()
                .with("id", "1")
                .with("email", "admin@transit.in")
                .with("password", "admin123")
                .with("user_type", "admin")
                .with("is_active", "True"),
        )
        .unwrap();
    let auth = db.auth();
    assert!(matches!(
        auth.login("admin@transit.in", "admin123", UserType::Admin),
        Err(ServiceError::InvalidCredentials)
    ));

    auth.reset_password("1", "new-admin-pass").unwrap();
    assert!(auth.login("admin@transit.in", "new-admin-pass", UserType::Admin).is_ok());
}

#[test]
fn mixed_case_email_rows_can_log_in() {
    let (_dir, db) = open_db();
    db.store()
        .append(
            Table::Users.name(),
            &Record::new()
                .with("id", "1")
                .with("email", "Ravi.Kumar@Transit.IN")
                .with("password", hash_password("s3cret-pass"))
                .with("user_type", "driver")
                .with("is_active", "True"),
        )
        .unwrap();
    let auth = db.auth();
    let user = auth.login("ravi.kumar@transit.in", "s3cret-pass", UserType::Driver).unwrap();
    assert_eq!(user.id, "1");
    assert!(auth.login("RAVI.KUMAR@TRANSIT.IN ", "s3cret-pass", UserType::Driver).is_ok());

    // 同一邮箱换个大小写也不能再注册
    assert!(matches!(
        auth.register(&registration("ravi.kumar@transit.in", UserType::User)),
        Err(ServiceError::Duplicate(_))
    ));
}

#[test]
fn deactivated_user_cannot_log_in() {
    let (_dir, db) = open_db();
    let auth = db.auth();
    let user = auth.register(&registration("rider@transit.in", UserType::User)).unwrap();
    auth.set_active(&user.id, false).unwrap();
    assert!(matches!(
        auth.login("rider@transit.in", "s3cret-pass", UserType::User),
        Err(ServiceError::InvalidCredentials)
    ));
    assert!(matches!(auth.set_active("42", true), Err(ServiceError::NotFound { .. })));
}

fn position(lat: f64, timestamp: &str) -> PositionUpdate {
    PositionUpdate {
        bus_id: "7".to_string(),
        driver_id: None,
        latitude: lat,
        longitude: 73.85,
        speed: 42.0,
        direction: 270.0,
        timestamp: Some(timestamp.to_string()),
    }
}

#[test]
fn tracking_mirrors_latest_position_onto_bus() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let tracking = db.tracking();

    let point = tracking.record_position(&position(18.52, "2024-06-01T10:00:00")).unwrap();
    assert_eq!(point.driver_id, "5");
    assert_eq!(point.route_id, "2");
    assert_eq!(point.timestamp, "2024-06-01T10:00:00.000000");

    tracking.record_position(&position(18.60, "2024-06-01 10:05:00")).unwrap();
    // 迟到的旧定位不覆盖车辆位置
    tracking.record_position(&position(18.40, "2024-06-01T09:55:00")).unwrap();

    let latest = tracking.latest("7").unwrap().unwrap();
    assert_eq!(latest.latitude, 18.60);
    let bus = db.search().bus("7").unwrap();
    assert_eq!(bus.current_location_lat, Some(18.60));
    assert_eq!(bus.current_location_lng, Some(73.85));

    let history = tracking.history("7").unwrap().unwrap();
    let lats: Vec<f64> = history.route.iter().map(|p| p.latitude).collect();
    assert_eq!(lats, vec![18.40, 18.52, 18.60]);
    assert_eq!(history.latest_position.latitude, 18.60);
    assert_eq!(history.eta, 15);

    assert!(tracking.history("8").unwrap().is_none());
}

#[test]
fn concurrent_reports_leave_the_newest_position_on_the_bus() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);

    for round in 0..20 {
        let older = position(10.0 + round as f64, &format!("2024-06-01T10:{:02}:00", round));
        let newer = position(50.0 + round as f64, &format!("2024-06-01T10:{:02}:30", round));
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [older, newer]
            .into_iter()
            .map(|update| {
                let tracking = db.tracking();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    tracking.record_position(&update).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bus = db.search().bus("7").unwrap();
        assert_eq!(bus.current_location_lat, Some(50.0 + round as f64), "round {}", round);
    }
}

#[test]
fn tracking_validates_input() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let tracking = db.tracking();
    assert!(matches!(
        tracking.record_position(&position(123.0, "2024-06-01T10:00:00")),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        tracking.record_position(&position(18.5, "soon")),
        Err(ServiceError::Validation(_))
    ));
    let unknown_bus = PositionUpdate { bus_id: "99".to_string(), ..position(18.5, "2024-06-01T10:00:00") };
    assert!(matches!(tracking.record_position(&unknown_bus), Err(ServiceError::NotFound { .. })));
}

#[test]
fn tracking_history_is_capped_per_bus() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        max_tracking_records_per_bus: 3,
        ..StoreConfig::for_dir(dir.path())
    };
    let db = Database::open(config).unwrap();
    seed_fleet(&db, 40);
    let tracking = db.tracking();

    for minute in 0..5 {
        let ts = format!("2024-06-01T10:0{}:00", minute);
        tracking.record_position(&position(18.0 + minute as f64, &ts)).unwrap();
    }
    let history = tracking.history("7").unwrap().unwrap();
    let lats: Vec<f64> = history.route.iter().map(|p| p.latitude).collect();
    assert_eq!(lats, vec![20.0, 21.0, 22.0]);
}

#[test]
fn search_joins_routes_and_buses() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    db.store()
        .append(
            Table::Buses.name(),
            &Record::new()
                .with("id", "8")
                .with("bus_number", "KA-01-F-1234")
                .with("route_id", "3")
                .with("capacity", "30")
                .with("status", "active"),
        )
        .unwrap();
    let search = db.search();

    let results = search.search(" pune", "MUMBAI ").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].bus.id, "7");
    assert_eq!(results[0].route_name, "Pune - Mumbai Express");
    assert_eq!(results[0].fare, 300.0);

    assert!(search.search("Pune", "Goa").unwrap().is_empty());
    assert!(matches!(search.search("", "Goa"), Err(ServiceError::Validation(_))));
    assert_eq!(search.bus_by_number("KA-01-F-1234").unwrap().id, "8");
    assert!(matches!(search.route("3"), Err(ServiceError::NotFound { .. })));

    let json = serde_json::to_value(&results[0]).unwrap();
    assert_eq!(json["bus_number"], "MH-12-AB-4321");
    assert_eq!(json["route_name"], "Pune - Mumbai Express");
}

fn new_bus(number: &str, capacity: Option<u32>) -> NewBus {
    NewBus {
        bus_number: number.to_string(),
        bus_name: "Shivneri".to_string(),
        route_id: "2".to_string(),
        driver_id: None,
        capacity,
    }
}

#[test]
fn bus_capacity_is_bounded_by_config() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let fleet = db.fleet();
    let max = db.config().max_bus_capacity;

    assert!(matches!(
        fleet.add_bus(&new_bus("KA-05-X-1", Some(max + 1))),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(fleet.add_bus(&new_bus("KA-05-X-1", Some(0))), Err(ServiceError::Validation(_))));
    assert_eq!(db.store().read_all(Table::Buses.name()).unwrap().len(), 1);

    let bus = fleet.add_bus(&new_bus("KA-05-X-1", Some(max))).unwrap();
    assert_eq!(bus.capacity, max);
    assert!(matches!(fleet.set_capacity(&bus.id, max + 1), Err(ServiceError::Validation(_))));
    assert_eq!(fleet.set_capacity(&bus.id, 20).unwrap().capacity, 20);

    let defaulted = fleet.add_bus(&new_bus("KA-05-X-2", None)).unwrap();
    assert_eq!(defaulted.capacity, db.config().default_bus_capacity);
}

#[test]
fn add_bus_checks_number_route_and_driver() {
    let (_dir, db) = open_db();
    seed_fleet(&db, 40);
    let fleet = db.fleet();

    assert!(matches!(
        fleet.add_bus(&new_bus(" mh-12-ab-4321 ", None)),
        Err(ServiceError::Duplicate(_))
    ));
    let elsewhere = NewBus { route_id: "9".to_string(), ..new_bus("KA-05-X-1", None) };
    assert!(matches!(fleet.add_bus(&elsewhere), Err(ServiceError::NotFound { .. })));
    // 用户 1 是乘客
    let rider_driven = NewBus { driver_id: Some("1".to_string()), ..new_bus("KA-05-X-1", None) };
    assert!(matches!(fleet.add_bus(&rider_driven), Err(ServiceError::Validation(_))));

    let driver = db.auth().register(&registration("ravi@transit.in", UserType::Driver)).unwrap();
    let driven = NewBus { driver_id: Some(driver.id.clone()), ..new_bus("KA-05-X-1", None) };
    let bus = fleet.add_bus(&driven).unwrap();
    assert_eq!(bus.id, "8");
    assert_eq!(bus.driver_id, driver.id);
    assert_eq!(bus.status, BusStatus::Active);

    assert_eq!(fleet.set_status(&bus.id, BusStatus::Maintenance).unwrap().status, BusStatus::Maintenance);
    assert!(matches!(fleet.set_status("99", BusStatus::Active), Err(ServiceError::NotFound { .. })));
}
