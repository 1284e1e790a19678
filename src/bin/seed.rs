use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use transit_store::core::models::UserType;
use transit_store::core::schema::{Table, DEFAULT_ID_FIELD};
use transit_store::core::types::now_timestamp;
use transit_store::service::{NewBus, Registration};
use transit_store::{Database, Record, StoreConfig};

/// 向数据目录写入一组演示用的线路、车辆和账号
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: StoreConfig,
}

fn main() -> Result<()> {
    transit_store::logging::init();
    let args = Args::parse();
    let db = Database::open(args.config).context("无法打开数据目录")?;
    let store = db.store();

    if !store.read_all(Table::Routes.name())?.is_empty() {
        println!("routes 表已有数据，跳过");
        return Ok(());
    }

    let now = now_timestamp();
    let routes = [
        ("Majestic - Electronic City", "Bengaluru", "Electronic City", "18.5", "55", "45", "Majestic;Lalbagh;Silk Board"),
        ("Pune - Mumbai Express", "Pune", "Mumbai", "150", "180", "300", "Lonavala;Khopoli;Panvel"),
    ];
    for (name, source, destination, distance, duration, fare, stops) in routes {
        let record = Record::new()
            .with("route_name", name)
            .with("source", source)
            .with("destination", destination)
            .with("distance_km", distance)
            .with("estimated_duration_min", duration)
            .with("fare", fare)
            .with("stops", stops)
            .with("created_at", now.as_str())
            .with("updated_at", now.as_str());
        store.insert(Table::Routes.name(), DEFAULT_ID_FIELD, &record)?;
    }

    let auth = db.auth();
    let driver = auth.register(&Registration {
        username: "driver_ravi".to_string(),
        email: "ravi@transit.example".to_string(),
        password: "change-me-please".to_string(),
        phone: "9800000001".to_string(),
        full_name: "Ravi Kumar".to_string(),
        user_type: UserType::Driver,
    })?;
    auth.register(&Registration {
        username: "admin".to_string(),
        email: "admin@transit.example".to_string(),
        password: "change-me-please".to_string(),
        phone: String::new(),
        full_name: "Depot Admin".to_string(),
        user_type: UserType::Admin,
    })?;

    let fleet = db.fleet();
    let buses = [("KA-01-F-1234", "Volvo 500D", "1"), ("MH-12-AB-4321", "Shivneri", "2")];
    for (number, name, route_id) in buses {
        fleet.add_bus(&NewBus {
            bus_number: number.to_string(),
            bus_name: name.to_string(),
            route_id: route_id.to_string(),
            driver_id: Some(driver.id.clone()),
            capacity: None,
        })?;
    }

    info!(data_dir = %store.base_dir().display(), "演示数据已写入");
    Ok(())
}
