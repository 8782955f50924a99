use lungo::listener::RemovalCause;
use lungo::{build_key, Cache, CacheBuilder, ReqInfo, Request};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

fn make_cache(max_size: i64) -> Cache<String> {
    CacheBuilder::new().max_size(max_size).build()
}

// ---------------------------------------------------------------------------
// Fundamental API correctness
// ---------------------------------------------------------------------------

#[test]
fn get_returns_none_on_miss() {
    let cache = make_cache(10);
    assert!(cache.get("missing").is_none());
}

#[test]
fn set_get_delete_round_trip() {
    let cache = make_cache(10);
    cache.set("power", "9000".to_string(), MINUTE);
    assert_eq!(cache.get("power").unwrap().value().as_str(), "9000");
    assert!(cache.delete("power"));
    assert!(cache.get("power").is_none());
}

#[test]
fn second_delete_is_a_miss() {
    let cache = make_cache(10);
    cache.set("k", "v".to_string(), MINUTE);
    assert!(cache.delete("k"));
    assert!(!cache.delete("k"));
}

#[test]
fn set_replaces_value_without_growing() {
    let cache = make_cache(10);
    cache.set("power", "9000".to_string(), MINUTE);
    cache.set("power", "9001".to_string(), MINUTE);
    assert_eq!(cache.get("power").unwrap().value().as_str(), "9001");
    assert_eq!(cache.item_count(), 1, "replace must not create a second item");
}

#[test]
fn replaced_item_is_handed_to_the_listener() {
    let displaced: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&displaced);

    let cache: Cache<String> = CacheBuilder::new()
        .max_size(10)
        .on_delete(move |item: &lungo::Item<String>, cause| {
            if cause == RemovalCause::Replaced {
                log.lock().unwrap().push(item.value().to_string());
            }
        })
        .build();

    cache.set("power", "9000".to_string(), MINUTE);
    cache.set("power", "9001".to_string(), MINUTE);

    assert_eq!(*displaced.lock().unwrap(), vec!["9000".to_string()]);
    assert_eq!(cache.get("power").unwrap().value().as_str(), "9001");
}

#[test]
fn cache_is_clone_and_shared() {
    let c1 = make_cache(10);
    let c2 = c1.clone();
    c1.set("shared", "yes".to_string(), MINUTE);
    assert!(
        c2.get("shared").is_some(),
        "cloned handle must see the same items"
    );
}

#[test]
fn stop_is_a_harmless_no_op() {
    let cache = make_cache(10);
    cache.set("k", "v".to_string(), MINUTE);
    cache.stop();
    assert!(cache.get("k").is_some());
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[test]
fn get_returns_expired_items() {
    let cache = make_cache(10);
    cache.set("k", "v".to_string(), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(30));

    let item = cache.get("k").expect("expired items are still returned");
    assert!(item.expired());
    assert_eq!(item.ttl(), Duration::ZERO);
}

#[test]
fn extend_revives_an_expiring_item() {
    let cache = make_cache(10);
    cache.set("k", "v".to_string(), Duration::from_millis(10));
    cache.get("k").unwrap().extend(MINUTE);
    std::thread::sleep(Duration::from_millis(30));
    assert!(!cache.get("k").unwrap().expired());
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[test]
fn fetch_caches_on_success_only() {
    let cache = make_cache(10);

    let item = cache
        .fetch("k", MINUTE, || Ok::<_, String>("v".to_string()))
        .unwrap();
    assert_eq!(item.value().as_str(), "v");

    // Cached now — the second fetcher must never run.
    let item = cache
        .fetch("k", MINUTE, || -> Result<String, String> {
            panic!("fetcher called despite a fresh cached item")
        })
        .unwrap();
    assert_eq!(item.value().as_str(), "v");

    let err = cache
        .fetch("k2", MINUTE, || Err::<String, _>("backend down".to_string()))
        .unwrap_err();
    assert_eq!(err, "backend down");
    assert!(cache.get("k2").is_none(), "a failed fetch must cache nothing");
}

#[test]
fn fetch_treats_expired_items_as_misses() {
    let cache = make_cache(10);
    cache.set("k", "stale".to_string(), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(30));

    let item = cache
        .fetch("k", MINUTE, || Ok::<_, String>("fresh".to_string()))
        .unwrap();
    assert_eq!(item.value().as_str(), "fresh");
    assert!(!cache.get("k").unwrap().expired());
}

// ---------------------------------------------------------------------------
// Replace
// ---------------------------------------------------------------------------

#[test]
fn replace_only_touches_cached_keys() {
    let cache = make_cache(10);
    assert!(!cache.replace("absent", "v".to_string()));
    assert!(cache.get("absent").is_none(), "replace must not insert");

    cache.set("k", "v1".to_string(), MINUTE);
    assert!(cache.replace("k", "v2".to_string()));
    assert_eq!(cache.get("k").unwrap().value().as_str(), "v2");
}

#[test]
fn replace_keeps_remaining_ttl() {
    let cache = make_cache(10);
    cache.set("k", "v1".to_string(), MINUTE);
    std::thread::sleep(Duration::from_millis(50));
    assert!(cache.replace("k", "v2".to_string()));

    let ttl = cache.get("k").unwrap().ttl();
    assert!(
        ttl <= MINUTE - Duration::from_millis(40),
        "replace must not reset the TTL (remaining: {ttl:?})"
    );
    assert!(ttl > Duration::from_secs(50));
}

#[test]
fn replacing_an_expired_item_leaves_it_expired() {
    let cache = make_cache(10);
    cache.set("k", "v1".to_string(), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(30));

    assert!(cache.replace("k", "v2".to_string()));
    let item = cache.get("k").unwrap();
    assert_eq!(item.value().as_str(), "v2");
    assert!(item.expired(), "zero remaining TTL must not extend life");
}

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

#[test]
fn replace_blends_req_size_with_update_ratio() {
    let cache: Cache<String> = CacheBuilder::new()
        .max_size(100)
        .update_ratio(0.5)
        .build();

    cache.set_with_info("k", "v1".to_string(), ReqInfo::new(10.0, 10.0), MINUTE);
    cache.set_with_info("k", "v2".to_string(), ReqInfo::new(20.0, 20.0), MINUTE);

    let info = cache.get("k").unwrap().req_info();
    assert_eq!(info.req_size, 0.5 * 20.0 + 0.5 * 10.0);
    assert_eq!(info.missing_size, 20.0, "missing_size is not blended");
}

// ---------------------------------------------------------------------------
// Capacity enforcement
// ---------------------------------------------------------------------------

#[test]
fn size_stays_bounded_under_sequential_load() {
    let cache: Cache<String> = CacheBuilder::new()
        .max_size(50)
        .buckets(8)
        .candidates(4)
        .items_to_prune(2)
        .build();

    for i in 0..250 {
        cache.set(&format!("k{i}"), i.to_string(), MINUTE);
    }
    assert!(
        cache.size() <= 50,
        "size {} exceeds budget with no concurrent writers",
        cache.size()
    );
    assert_eq!(cache.size(), cache.item_count() as i64);
}

#[test]
fn eviction_respects_a_byte_weigher() {
    let cache: Cache<Vec<u8>> = CacheBuilder::new()
        .max_size(100)
        .buckets(4)
        .candidates(4)
        .items_to_prune(1)
        .weigher(|_k: &str, v: &Vec<u8>| v.len() as i64)
        .build();

    for i in 0..20 {
        cache.set(&format!("k{i}"), vec![0u8; 10], MINUTE);
    }
    assert!(cache.size() <= 100, "byte budget exceeded: {}", cache.size());
    assert!(cache.item_count() <= 10);
}

#[test]
fn capacity_evictions_fire_the_listener() {
    let causes: Arc<Mutex<Vec<RemovalCause>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&causes);

    let cache: Cache<String> = CacheBuilder::new()
        .max_size(5)
        .buckets(4)
        .candidates(3)
        .items_to_prune(1)
        .on_delete(move |_item: &lungo::Item<String>, cause| {
            log.lock().unwrap().push(cause);
        })
        .build();

    for i in 0..20 {
        cache.set(&format!("k{i}"), i.to_string(), MINUTE);
    }

    let causes = causes.lock().unwrap();
    assert!(!causes.is_empty(), "expected at least one eviction");
    assert!(causes.iter().all(|c| *c == RemovalCause::Capacity));
    assert_eq!(cache.stats().evictions as usize, causes.len());
}

#[test]
fn set_then_delete_restores_size_with_one_callback() {
    let deletions = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&deletions);

    let cache: Cache<String> = CacheBuilder::new()
        .max_size(100)
        .on_delete(move |_item: &lungo::Item<String>, _cause| {
            *counter.lock().unwrap() += 1;
        })
        .build();

    cache.set("warm", "x".to_string(), MINUTE);
    let before = cache.size();

    cache.set("k", "v".to_string(), MINUTE);
    assert!(cache.delete("k"));

    assert_eq!(cache.size(), before);
    assert_eq!(*deletions.lock().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

#[test]
fn tracking_get_distinguishes_hit_and_miss() {
    let cache: Cache<String> = CacheBuilder::new().max_size(10).track().build();
    cache.set("k", "v".to_string(), MINUTE);

    let hit = cache.tracking_get("k");
    assert_eq!(hit.value().unwrap().as_str(), "v");
    assert!(!hit.expired());
    hit.release();

    let miss = cache.tracking_get("absent");
    assert!(miss.value().is_none());
    assert!(miss.expired(), "the miss sentinel is always expired");
}

#[test]
fn pinned_items_survive_eviction_pressure() {
    let cache: Cache<String> = CacheBuilder::new()
        .max_size(10)
        .buckets(4)
        .candidates(4)
        .items_to_prune(2)
        .track()
        .build();

    cache.set("pinned", "keep".to_string(), MINUTE);
    let guard = cache.tracking_get("pinned");

    for i in 0..100 {
        cache.set(&format!("k{i}"), i.to_string(), MINUTE);
    }

    assert!(
        cache.get("pinned").is_some(),
        "a pinned item must never be chosen as a victim"
    );
    drop(guard);
}

// ---------------------------------------------------------------------------
// Page batches
// ---------------------------------------------------------------------------

#[test]
fn set_page_then_get_page_round_trips() {
    let cache: Cache<String> = CacheBuilder::new().max_size(100).build();

    let inserts = vec![
        Request::with_obj(1, 10, "page-a".to_string()),
        Request::with_obj(1, 11, "page-b".to_string()),
        Request::with_obj(2, 10, "page-c".to_string()),
    ];
    cache.set_page(&inserts, MINUTE);

    let mut lookups = vec![
        Request::new(1, 10),
        Request::new(1, 11),
        Request::new(2, 10),
        Request::new(9, 99),
    ];
    cache.get_page(&mut lookups);

    assert_eq!(lookups[0].obj.as_ref().unwrap().as_str(), "page-a");
    assert_eq!(lookups[1].obj.as_ref().unwrap().as_str(), "page-b");
    assert_eq!(lookups[2].obj.as_ref().unwrap().as_str(), "page-c");
    assert!(lookups[3].obj.is_none(), "missing page must stay empty");
}

#[test]
fn page_items_share_batch_metadata() {
    // Three unit-size objects: every item's req_size is the batch total.
    let cache: Cache<String> = CacheBuilder::new().max_size(100).build();
    let batch = vec![
        Request::with_obj(1, 1, "a".to_string()),
        Request::with_obj(1, 2, "b".to_string()),
        Request::with_obj(1, 3, "c".to_string()),
    ];
    cache.set_page(&batch, MINUTE);

    for uri in 1..=3 {
        let info = cache.get(&build_key(1, uri)).unwrap().req_info();
        assert_eq!(info.req_size, 3.0);
        assert_eq!(info.missing_size, 3.0);
    }
}

#[test]
fn admission_policy_drops_oversized_page_batches() {
    let cache: Cache<String> = CacheBuilder::new()
        .max_size(5)
        .buckets(4)
        .candidates(3)
        .items_to_prune(1)
        .admission_policy()
        .admission_threshold(1)
        .build();

    for i in 0..5 {
        cache.set(&format!("warm{i}"), "x".to_string(), MINUTE);
    }
    assert_eq!(cache.size(), 5);

    // Would overflow the budget and exceeds the threshold: dropped whole.
    let rejected = vec![
        Request::with_obj(1, 1, "a".to_string()),
        Request::with_obj(1, 2, "b".to_string()),
    ];
    cache.set_page_with_missing_size(&rejected, 4, MINUTE);
    assert!(cache.get(&build_key(1, 1)).is_none());
    assert!(cache.get(&build_key(1, 2)).is_none());
    assert_eq!(cache.size(), 5, "a dropped batch must not mutate the cache");
    assert_eq!(cache.stats().rejections, 1);

    // Exceeding the threshold alone is not enough: with room in the budget
    // the batch is admitted.
    assert!(cache.delete("warm0"));
    assert!(cache.delete("warm1"));
    assert!(cache.delete("warm2"));
    let admitted = vec![Request::with_obj(2, 1, "c".to_string())];
    cache.set_page_with_missing_size(&admitted, 2, MINUTE);
    assert!(cache.get(&build_key(2, 1)).is_some());
    assert_eq!(cache.stats().rejections, 1, "no further drops");
}

#[test]
fn missing_size_is_recorded_on_page_items() {
    let cache: Cache<String> = CacheBuilder::new().max_size(100).build();
    let batch = vec![
        Request::with_obj(3, 1, "a".to_string()),
        Request::with_obj(3, 2, "b".to_string()),
    ];
    cache.set_page_with_missing_size(&batch, 7, MINUTE);

    let info = cache.get(&build_key(3, 1)).unwrap().req_info();
    assert_eq!(info.req_size, 2.0, "req_size is the batch's summed cost");
    assert_eq!(info.missing_size, 7.0, "missing_size is the caller's figure");
}

// ---------------------------------------------------------------------------
// Clear + stats
// ---------------------------------------------------------------------------

#[test]
fn clear_empties_the_cache() {
    let cache = make_cache(100);
    for i in 0..20 {
        cache.set(&format!("k{i}"), i.to_string(), MINUTE);
    }
    cache.clear();
    assert_eq!(cache.size(), 0);
    assert!(cache.is_empty());
    for i in 0..20 {
        assert!(cache.get(&format!("k{i}")).is_none());
    }
}

#[test]
fn stats_track_hits_and_misses() {
    let cache = make_cache(10);
    cache.set("k", "v".to_string(), MINUTE);
    cache.get("k");
    cache.get("k");
    cache.get("nope");

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.request_count(), 3);
    assert!(
        (stats.hit_rate - 2.0 / 3.0).abs() < 1e-9,
        "hit_rate = {}",
        stats.hit_rate
    );
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_set_and_get_keep_size_near_budget() {
    const MAX: i64 = 500;
    const THREADS: usize = 8;

    let cache: Cache<String> = CacheBuilder::new()
        .max_size(MAX)
        .buckets(16)
        .candidates(8)
        .items_to_prune(10)
        .build();

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let c = cache.clone();
        handles.push(std::thread::spawn(move || {
            for j in 0..400 {
                let key = format!("t{t}-k{j}");
                c.set(&key, key.clone(), MINUTE);
                let _ = c.get(&key);
                if j % 5 == 0 {
                    c.delete(&key);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // After all writers return, overshoot is bounded by the items admitted
    // concurrently with the last eviction pass — at most one per thread.
    assert!(
        cache.size() <= MAX + THREADS as i64,
        "size {} is past budget + slack",
        cache.size()
    );
    assert_eq!(cache.size(), cache.item_count() as i64);
}
