use super::*;
use std::thread;
use tokio::io::{duplex, sink};

fn peer(category: Category, x: i32, y: i32) -> Arc<PeerConnection> {
    Arc::new(PeerConnection::new(
        category,
        Coordinate::new(x, y),
        Box::new(sink()),
    ))
}

#[test]
fn test_register_and_snapshot() {
    let registry = Registry::new(4);
    let a = peer(Category::Temperature, 0, 0);
    let b = peer(Category::Temperature, 1, 1);
    let c = peer(Category::Humidity, 2, 2);

    registry.register(a.clone()).unwrap();
    registry.register(b.clone()).unwrap();
    registry.register(c.clone()).unwrap();

    let temps = registry.snapshot(Category::Temperature);
    assert_eq!(temps.len(), 2);
    assert!(temps.iter().any(|p| p.id == a.id));
    assert!(temps.iter().any(|p| p.id == b.id));

    assert_eq!(registry.len(Category::Humidity), 1);
    assert_eq!(registry.len(Category::AirQuality), 0);
    assert_eq!(registry.total(), 3);
}

#[test]
fn test_register_past_capacity_fails() {
    let registry = Registry::new(2);
    registry.register(peer(Category::AirQuality, 0, 0)).unwrap();
    registry.register(peer(Category::AirQuality, 0, 1)).unwrap();

    let result = registry.register(peer(Category::AirQuality, 0, 2));
    assert_eq!(
        result.unwrap_err(),
        RegistryError::Full {
            category: Category::AirQuality,
            capacity: 2
        }
    );
    assert_eq!(registry.len(Category::AirQuality), 2);

    // Other categories keep their own capacity
    registry.register(peer(Category::Temperature, 0, 0)).unwrap();
}

#[test]
fn test_shared_coordinates_are_not_deduplicated() {
    let registry = Registry::new(8);
    registry.register(peer(Category::Temperature, 5, 5)).unwrap();
    registry.register(peer(Category::Temperature, 5, 5)).unwrap();
    assert_eq!(registry.len(Category::Temperature), 2);
}

#[test]
fn test_deregister_swap_remove() {
    let registry = Registry::new(8);
    let peers: Vec<_> = (0..4).map(|i| peer(Category::Humidity, i, 0)).collect();
    for p in &peers {
        registry.register(p.clone()).unwrap();
    }

    assert!(registry.deregister(peers[0].id, Category::Humidity));

    let remaining = registry.snapshot(Category::Humidity);
    assert_eq!(remaining.len(), 3);
    assert!(!registry.contains(peers[0].id, Category::Humidity));
    for p in &peers[1..] {
        assert!(registry.contains(p.id, Category::Humidity));
    }
}

#[test]
fn test_deregister_is_idempotent() {
    let registry = Registry::new(8);
    let p = peer(Category::Temperature, 3, 3);
    registry.register(p.clone()).unwrap();

    assert!(registry.deregister(p.id, Category::Temperature));
    assert!(!registry.deregister(p.id, Category::Temperature));
    assert_eq!(registry.len(Category::Temperature), 0);
}

#[test]
fn test_deregister_wrong_category_is_noop() {
    let registry = Registry::new(8);
    let p = peer(Category::Temperature, 3, 3);
    registry.register(p.clone()).unwrap();

    assert!(!registry.deregister(p.id, Category::Humidity));
    assert_eq!(registry.len(Category::Temperature), 1);
}

#[test]
fn test_concurrent_register_and_deregister() {
    let registry = Arc::new(Registry::new(64));
    let mut handles = vec![];

    // Each thread registers a peer, then half of them leave again
    for i in 0..32 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            let p = peer(Category::Temperature, i % 10, i / 10);
            registry.register(p.clone()).unwrap();
            if i % 2 == 0 {
                assert!(registry.deregister(p.id, Category::Temperature));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(Category::Temperature), 16);
}

#[test]
fn test_concurrent_deregister_removes_once() {
    let registry = Arc::new(Registry::new(8));
    let p = peer(Category::Humidity, 1, 1);
    registry.register(p.clone()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let id = p.id;
            thread::spawn(move || registry.deregister(id, Category::Humidity))
        })
        .collect();

    let removed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&removed| removed)
        .count();

    assert_eq!(removed, 1);
}

#[test]
fn test_concurrent_registration_respects_capacity() {
    let registry = Arc::new(Registry::new(10));

    let handles: Vec<_> = (0..25)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.register(peer(Category::AirQuality, i % 10, 0)).is_ok())
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(accepted, 10);
    assert_eq!(registry.len(Category::AirQuality), 10);
}

#[tokio::test]
async fn test_peer_send_writes_full_record() {
    let (writer, mut reader) = duplex(64);
    let p = PeerConnection::new(Category::Temperature, Coordinate::new(0, 0), Box::new(writer));
    let reading = SensorReading::new(Category::Temperature, Coordinate::new(4, 2), 33.0);

    p.send(&reading).await.unwrap();

    let received = crate::wire::read_record(&mut reader).await.unwrap();
    assert_eq!(received, Some(reading));
}

#[test]
fn test_connection_ids_are_unique() {
    let a = ConnectionId::next();
    let b = ConnectionId::next();
    assert_ne!(a, b);
}
