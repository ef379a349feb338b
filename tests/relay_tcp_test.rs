// Integration tests for the relay over real loopback TCP connections.
//
// Each test binds its own listener on an ephemeral port and drives raw
// sensor connections with the wire codec.

use fieldmesh::metrics::RelayMetrics;
use fieldmesh::registry::Registry;
use fieldmesh::relay::{Broadcaster, EchoPolicy, RelayServer};
use fieldmesh::wire::{read_record, write_record, Category, Coordinate, SensorReading, RECORD_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

// ── Test helpers ─────────────────────────────────────────────────────────────

async fn start_relay(capacity: usize, echo_policy: EchoPolicy) -> (SocketAddr, Arc<Registry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let registry = Arc::new(Registry::new(capacity));
    let broadcaster = Broadcaster::new(Arc::clone(&registry), RelayMetrics::new(), echo_policy);
    let server = RelayServer::from_listener(listener, broadcaster);
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, registry)
}

async fn wait_for(registry: &Registry, category: Category, count: usize) {
    for _ in 0..200 {
        if registry.len(category) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "registry never reached {} {} sensors (has {})",
        count,
        category,
        registry.len(category)
    );
}

async fn connect_sensor(
    addr: SocketAddr,
    registry: &Registry,
    category: Category,
    x: i32,
    y: i32,
) -> TcpStream {
    let expected = registry.len(category) + 1;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let registration = SensorReading::new(category, Coordinate::new(x, y), 30.0);
    write_record(&mut stream, &registration).await.unwrap();
    wait_for(registry, category, expected).await;
    stream
}

async fn next(stream: &mut TcpStream) -> SensorReading {
    timeout(Duration::from_secs(2), read_record(stream))
        .await
        .expect("timed out waiting for a record")
        .unwrap()
        .expect("relay closed the connection")
}

async fn assert_silent(stream: &mut TcpStream) {
    let pending = timeout(Duration::from_millis(100), read_record(stream)).await;
    assert!(pending.is_err(), "expected no further records");
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_fans_out_to_category_including_sender() {
    let (addr, registry) = start_relay(8, EchoPolicy::Include).await;
    let mut a = connect_sensor(addr, &registry, Category::Temperature, 0, 0).await;
    let mut b = connect_sensor(addr, &registry, Category::Temperature, 0, 1).await;
    let mut other = connect_sensor(addr, &registry, Category::Humidity, 0, 0).await;

    let report = SensorReading::new(Category::Temperature, Coordinate::new(0, 1), 35.0);
    write_record(&mut b, &report).await.unwrap();

    assert_eq!(next(&mut a).await, report);
    assert_eq!(next(&mut b).await, report);
    assert_silent(&mut a).await;
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn test_exclude_policy_over_tcp() {
    let (addr, registry) = start_relay(8, EchoPolicy::Exclude).await;
    let mut a = connect_sensor(addr, &registry, Category::AirQuality, 1, 1).await;
    let mut b = connect_sensor(addr, &registry, Category::AirQuality, 2, 2).await;

    let report = SensorReading::new(Category::AirQuality, Coordinate::new(1, 1), 18.0);
    write_record(&mut a, &report).await.unwrap();

    assert_eq!(next(&mut b).await, report);
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_disconnect_broadcasts_departure() {
    let (addr, registry) = start_relay(8, EchoPolicy::Include).await;
    let mut a = connect_sensor(addr, &registry, Category::Temperature, 0, 0).await;
    let b = connect_sensor(addr, &registry, Category::Temperature, 5, 6).await;

    drop(b);

    let departure = next(&mut a).await;
    assert!(departure.is_departure());
    assert_eq!(departure.category, Category::Temperature);
    assert_eq!(departure.coordinate, Coordinate::new(5, 6));
    assert_silent(&mut a).await;

    wait_for(&registry, Category::Temperature, 1).await;
}

#[tokio::test]
async fn test_record_split_across_writes_is_reassembled() {
    let (addr, registry) = start_relay(8, EchoPolicy::Include).await;
    let mut a = connect_sensor(addr, &registry, Category::Humidity, 0, 0).await;
    let mut b = connect_sensor(addr, &registry, Category::Humidity, 1, 0).await;

    let report = SensorReading::new(Category::Humidity, Coordinate::new(1, 0), 61.0);
    let bytes = report.encode();
    b.write_all(&bytes[..7]).await.unwrap();
    b.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    b.write_all(&bytes[7..]).await.unwrap();

    assert_eq!(next(&mut a).await, report);
}

#[tokio::test]
async fn test_registry_full_closes_connection() {
    let (addr, registry) = start_relay(1, EchoPolicy::Include).await;
    let mut first = connect_sensor(addr, &registry, Category::Temperature, 0, 0).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let registration = SensorReading::new(Category::Temperature, Coordinate::new(1, 1), 30.0);
    write_record(&mut second, &registration).await.unwrap();

    let closed = timeout(Duration::from_secs(2), read_record(&mut second))
        .await
        .expect("relay should close the rejected connection");
    assert!(matches!(closed, Ok(None) | Err(_)));
    assert_eq!(registry.len(Category::Temperature), 1);

    // The rejected sensor never announced a departure
    assert_silent(&mut first).await;
}

#[tokio::test]
async fn test_unknown_category_closes_connection() {
    let (addr, registry) = start_relay(8, EchoPolicy::Include).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = [0u8; RECORD_LEN];
    raw[..7].copy_from_slice(b"seismic");
    stream.write_all(&raw).await.unwrap();

    let closed = timeout(Duration::from_secs(2), read_record(&mut stream))
        .await
        .expect("relay should close the connection");
    assert!(matches!(closed, Ok(None) | Err(_)));
    assert_eq!(registry.total(), 0);
}

#[tokio::test]
async fn test_many_sensors_each_get_one_copy() {
    let (addr, registry) = start_relay(64, EchoPolicy::Include).await;

    let mut sensors = Vec::new();
    for i in 0..10 {
        sensors.push(connect_sensor(addr, &registry, Category::Temperature, i, i).await);
    }

    let report = SensorReading::new(Category::Temperature, Coordinate::new(3, 3), 27.0);
    write_record(&mut sensors[3], &report).await.unwrap();

    for sensor in sensors.iter_mut() {
        assert_eq!(next(sensor).await, report);
    }
    for sensor in sensors.iter_mut() {
        assert_silent(sensor).await;
    }
}
