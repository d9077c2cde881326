//! Tile loader integration tests.
//!
//! Tests verify:
//! - Strict priority order with FIFO inside a priority band
//! - De-duplication of pending and cached keys
//! - Advisory cancellation
//! - Failed decodes are dropped and can be requested again
//! - Stop/start lifecycle

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use wsi_viewer::error::PoolError;
use wsi_viewer::tile::{
    TileCache, TileKey, TileLoadPriority, TileLoadRequest, TileLoadThreadPool,
};

use super::test_utils::{solid_tile, wait_until, MockSlide};

const TIMEOUT: Duration = Duration::from_secs(10);
const TILE_SIZE: u32 = 128;

fn slide() -> Arc<MockSlide> {
    Arc::new(MockSlide::new(4096, 4096, vec![1.0, 2.0, 4.0]))
}

fn cache() -> Arc<TileCache> {
    Arc::new(TileCache::with_capacity(256 * 1024 * 1024))
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_priority_order_single_worker() {
    let ready = Arc::new(Mutex::new(Vec::new()));
    let ready_log = Arc::clone(&ready);

    let mut pool = TileLoadThreadPool::builder(slide(), cache())
        .workers(1)
        .tile_size(TILE_SIZE)
        .on_tile_ready(move |key| ready_log.lock().push(key))
        .build()
        .unwrap();

    let submissions = [
        (TileKey::new(0, 0, 0), TileLoadPriority::Adjacent),
        (TileKey::new(0, 1, 0), TileLoadPriority::Visible),
        (TileKey::new(0, 2, 0), TileLoadPriority::Urgent),
        (TileKey::new(0, 3, 0), TileLoadPriority::Adjacent),
        (TileKey::new(0, 4, 0), TileLoadPriority::Urgent),
        (TileKey::new(0, 5, 0), TileLoadPriority::Visible),
    ];

    // Queue everything before any worker runs
    for (key, priority) in submissions {
        assert!(pool.submit_request(TileLoadRequest::new(key, priority)));
    }
    assert_eq!(pool.queued_count(), 6);

    pool.start().unwrap();
    assert!(wait_until(TIMEOUT, || ready.lock().len() == 6));

    let order: Vec<u32> = ready.lock().iter().map(|key| key.tile_x).collect();
    assert_eq!(order, vec![2, 4, 1, 5, 0, 3]);
}

// =============================================================================
// De-duplication
// =============================================================================

#[test]
fn test_duplicate_submission_decoded_once() {
    let slide = slide();
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(2)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    let key = TileKey::new(1, 2, 3);
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Visible)));
    assert!(!pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));
    assert_eq!(pool.pending_count(), 1);

    pool.start().unwrap();
    assert!(wait_until(TIMEOUT, || pool.pending_count() == 0));

    assert_eq!(slide.read_count(), 1);
    assert!(cache.has_tile(&key));
}

#[test]
fn test_cached_key_never_queued() {
    let slide = slide();
    let cache = cache();
    let pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    let key = TileKey::new(0, 0, 0);
    cache.insert(key, solid_tile(TILE_SIZE, TILE_SIZE, 7));

    assert!(!pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));
    assert_eq!(pool.queued_count(), 0);
    assert!(!pool.is_pending(&key));
}

#[test]
fn test_tile_geometry_and_pixels() {
    let slide = slide();
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(1)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();
    pool.start().unwrap();

    // Level 2 is 1024 px wide: tile 7 is the last full tile
    let key = TileKey::new(2, 7, 1);
    pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent));
    assert!(wait_until(TIMEOUT, || cache.has_tile(&key)));

    let reads = slide.reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].level, 2);
    assert_eq!((reads[0].x, reads[0].y), (7 * 128 * 4, 128 * 4));
    assert_eq!((reads[0].width, reads[0].height), (TILE_SIZE, TILE_SIZE));

    let tile = cache.peek(&key).unwrap();
    assert_eq!(&tile.pixels()[..4], &[2, 0, 0, 255]);
}

#[test]
fn test_edge_tile_is_cropped() {
    let slide = Arc::new(MockSlide::new(1000, 300, vec![1.0]));
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(1)
        .tile_size(256)
        .build()
        .unwrap();
    pool.start().unwrap();

    let key = TileKey::new(0, 3, 1);
    pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent));
    assert!(wait_until(TIMEOUT, || cache.has_tile(&key)));

    let tile = cache.peek(&key).unwrap();
    assert_eq!((tile.width(), tile.height()), (1000 - 768, 300 - 256));
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancelled_request_is_skipped() {
    let slide = slide();
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(1)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    let cancelled = TileKey::new(0, 0, 0);
    let kept = TileKey::new(0, 1, 0);
    pool.submit_request(TileLoadRequest::new(cancelled, TileLoadPriority::Urgent));
    pool.submit_request(TileLoadRequest::new(kept, TileLoadPriority::Urgent));

    assert!(pool.cancel_request(&cancelled));
    assert!(!pool.cancel_request(&cancelled));

    pool.start().unwrap();
    assert!(wait_until(TIMEOUT, || cache.has_tile(&kept)));
    assert!(wait_until(TIMEOUT, || pool.queued_count() == 0));

    assert!(!cache.has_tile(&cancelled));
    assert_eq!(slide.read_count(), 1);
}

#[test]
fn test_cancel_all_drains_queue() {
    let pool = TileLoadThreadPool::builder(slide(), cache())
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    for x in 0..10 {
        pool.submit_request(TileLoadRequest::new(
            TileKey::new(0, x, 0),
            TileLoadPriority::Adjacent,
        ));
    }
    assert_eq!(pool.pending_count(), 10);

    pool.cancel_all_requests();
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.queued_count(), 0);
}

#[test]
fn test_resubmit_after_cancel_decoded_once() {
    let slide = Arc::new(MockSlide::new(4096, 4096, vec![1.0]).with_delay(Duration::from_millis(200)));
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(2)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    let key = TileKey::new(0, 0, 0);
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Visible)));
    assert!(pool.cancel_request(&key));
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));

    // The cancelled entry is still queued but does not own the key
    assert_eq!(pool.queued_count(), 2);
    assert_eq!(pool.pending_count(), 1);

    pool.start().unwrap();
    assert!(wait_until(TIMEOUT, || pool.active_count() == 1));

    // Still pending while the live request decodes
    assert!(!pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Visible)));

    assert!(wait_until(TIMEOUT, || cache.has_tile(&key) && pool.pending_count() == 0));
    assert!(wait_until(TIMEOUT, || pool.queued_count() == 0 && pool.active_count() == 0));
    assert_eq!(slide.read_count(), 1);
}

#[test]
fn test_cancel_during_decode_still_caches() {
    let slide = Arc::new(MockSlide::new(4096, 4096, vec![1.0]).with_delay(Duration::from_millis(200)));
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(1)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();
    pool.start().unwrap();

    let key = TileKey::new(0, 2, 2);
    pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent));
    assert!(wait_until(TIMEOUT, || pool.active_count() == 1));

    // Work in flight is not interrupted
    assert!(pool.cancel_request(&key));
    assert!(wait_until(TIMEOUT, || cache.has_tile(&key)));

    assert_eq!(slide.read_count(), 1);
    assert!(wait_until(TIMEOUT, || pool.active_count() == 0));
    assert_eq!(pool.pending_count(), 0);
}

#[test]
fn test_stop_during_decode_still_caches() {
    let slide = Arc::new(MockSlide::new(4096, 4096, vec![1.0]).with_delay(Duration::from_millis(200)));
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(1)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();
    pool.start().unwrap();

    let key = TileKey::new(0, 3, 1);
    pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent));
    assert!(wait_until(TIMEOUT, || pool.active_count() == 1));

    // stop joins the worker after its current decode
    pool.stop();

    assert!(cache.has_tile(&key));
    assert_eq!(slide.read_count(), 1);
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.active_count(), 0);
}

// =============================================================================
// Failure
// =============================================================================

#[test]
fn test_failed_decode_dropped_and_retryable() {
    let slide = Arc::new(MockSlide::new(4096, 4096, vec![1.0, 2.0]).failing_level(0));
    let cache = cache();
    let ready = Arc::new(Mutex::new(Vec::new()));
    let ready_log = Arc::clone(&ready);

    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(2)
        .tile_size(TILE_SIZE)
        .on_tile_ready(move |key| ready_log.lock().push(key))
        .build()
        .unwrap();
    pool.start().unwrap();

    let key = TileKey::new(0, 0, 0);
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));
    assert!(wait_until(TIMEOUT, || pool.pending_count() == 0));

    assert!(!cache.has_tile(&key));
    assert!(ready.lock().is_empty());

    // Nothing remembers the failure, so the tile can be requested again
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));
    assert!(wait_until(TIMEOUT, || slide.read_count() == 2));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_zero_workers_rejected() {
    let result = TileLoadThreadPool::builder(slide(), cache()).workers(0).build();
    assert!(matches!(result, Err(PoolError::NoWorkers)));
}

#[test]
fn test_stop_clears_and_restart_works() {
    let slide = slide();
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(3)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();

    for x in 0..5 {
        pool.submit_request(TileLoadRequest::new(TileKey::new(0, x, 0), TileLoadPriority::Visible));
    }
    pool.stop();
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.queued_count(), 0);

    pool.start().unwrap();
    assert!(pool.is_running());
    pool.start().unwrap();
    assert_eq!(pool.num_workers(), 3);

    let key = TileKey::new(0, 9, 9);
    assert!(pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent)));
    assert!(wait_until(TIMEOUT, || cache.has_tile(&key)));
    assert_eq!(slide.read_count(), 1);

    pool.stop();
    assert!(!pool.is_running());
}

#[test]
fn test_many_workers_load_everything_once() {
    let slide = Arc::new(MockSlide::new(4096, 4096, vec![1.0]).with_delay(Duration::from_millis(1)));
    let cache = cache();
    let mut pool = TileLoadThreadPool::builder(Arc::clone(&slide), Arc::clone(&cache))
        .workers(4)
        .tile_size(TILE_SIZE)
        .build()
        .unwrap();
    pool.start().unwrap();

    for y in 0..8 {
        for x in 0..8 {
            let key = TileKey::new(0, x, y);
            pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Visible));
            pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Visible));
        }
    }

    assert!(wait_until(TIMEOUT, || cache.tile_count() == 64));
    assert!(wait_until(TIMEOUT, || pool.pending_count() == 0));
    assert_eq!(slide.read_count(), 64);
}
