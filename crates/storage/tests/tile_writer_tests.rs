//! TileWriter behaviour on a real filesystem.

use storage::{SaveError, TileLayout, TileWriter, QUARANTINE_DIR};
use test_utils::TempCache;
use tile_common::{CacheTarget, TileCoord};

// ============================================================================
// Helper functions
// ============================================================================

fn layout(cache: &TempCache) -> TileLayout {
    TileLayout::new(cache.cache_root(), &CacheTarget::layer("roads"), "png")
}

fn leftover_temp_files(cache: &TempCache) -> usize {
    cache.files_with_extension(&cache.cache_root(), "tmp").len()
}

// ============================================================================
// Saving
// ============================================================================

#[tokio::test]
async fn test_save_creates_directories() {
    let cache = TempCache::new();
    let dest = layout(&cache).tile_path(&TileCoord::new(2, 1, 3));

    let saved = TileWriter::new(0).save(b"tile-bytes", &dest).await.unwrap();
    assert_eq!(saved.bytes, 10);
    assert_eq!(std::fs::read(&dest).unwrap(), b"tile-bytes");
    assert_eq!(leftover_temp_files(&cache), 0);
}

#[tokio::test]
async fn test_save_overwrites_existing_tile() {
    let cache = TempCache::new();
    let dest = layout(&cache).tile_path(&TileCoord::new(0, 0, 0));
    let writer = TileWriter::new(0);

    writer.save(b"old", &dest).await.unwrap();
    writer.save(b"newer", &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
}

#[tokio::test]
async fn test_concurrent_directory_creation() {
    let cache = TempCache::new();
    let layout = layout(&cache);
    let writer = TileWriter::new(0);

    let saves = (0..8u32).map(|y| {
        let dest = layout.tile_path(&TileCoord::new(5, 7, y));
        let writer = writer.clone();
        async move { writer.save(b"abc", &dest).await }
    });
    let mut handles = Vec::new();
    for save in saves {
        handles.push(tokio::spawn(save));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(cache.count_tiles("roads", "png"), 8);
}

// ============================================================================
// Quarantine
// ============================================================================

#[tokio::test]
async fn test_undersized_tile_is_quarantined() {
    let cache = TempCache::new();
    let layout = layout(&cache);
    let dest = layout.tile_path(&TileCoord::new(1, 0, 1));
    let writer = TileWriter::new(100).with_quarantine_dir(layout.quarantine_dir());

    let err = writer.save(b"tiny", &dest).await.unwrap_err();
    let quarantined = match err {
        SaveError::TooSmall {
            actual,
            minimum,
            quarantined,
            ..
        } => {
            assert_eq!((actual, minimum), (4, 100));
            quarantined.expect("tile should be quarantined")
        }
        other => panic!("unexpected error {:?}", other),
    };

    assert!(!dest.exists());
    assert!(quarantined.starts_with(cache.cache_root().join(QUARANTINE_DIR)));
    assert_eq!(std::fs::read(&quarantined).unwrap(), b"tiny");

    let mut record = quarantined.clone().into_os_string();
    record.push(".json");
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(record["reason"], "too_small");
    assert_eq!(record["bytes"], 4);
    assert_eq!(record["min_bytes"], 100);
    assert_eq!(leftover_temp_files(&cache), 0);
}

#[tokio::test]
async fn test_quarantine_keeps_same_tile_of_different_layers() {
    let cache = TempCache::new();
    let coord = TileCoord::new(1, 0, 1);
    let roads = layout(&cache);
    let parks = TileLayout::new(cache.cache_root(), &CacheTarget::layer("parks"), "png");
    let writer = TileWriter::new(100).with_quarantine_dir(roads.quarantine_dir());

    for layout in [&roads, &parks] {
        let err = writer.save(b"tiny", &layout.tile_path(&coord)).await.unwrap_err();
        assert!(matches!(err, SaveError::TooSmall { quarantined: Some(_), .. }));
    }

    let names: Vec<String> = cache
        .files_with_extension(&roads.quarantine_dir(), "png")
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with("_roads_1_0_1.png")));
    assert!(names.iter().any(|n| n.ends_with("_parks_1_0_1.png")));
}

#[tokio::test]
async fn test_min_bytes_zero_accepts_empty() {
    let cache = TempCache::new();
    let dest = layout(&cache).tile_path(&TileCoord::new(0, 0, 0));
    let saved = TileWriter::new(0).save(b"", &dest).await.unwrap();
    assert_eq!(saved.bytes, 0);
    assert!(dest.exists());
}

#[tokio::test]
async fn test_unwritable_destination_fails_cleanly() {
    let cache = TempCache::new();
    // A file where a directory is needed.
    let blocker = cache.write("cache/roads/3", "not a directory");
    let dest = blocker.join("1").join("2.png");

    let err = TileWriter::new(0).save(b"abc", &dest).await.unwrap_err();
    assert!(matches!(err, SaveError::WriteFailed { .. }));
    assert_eq!(err.reason(), "write_failed");
    assert!(!dest.exists());
}

#[tokio::test(start_paused = true)]
async fn test_failed_rename_does_not_sleep_after_last_attempt() {
    let cache = TempCache::new();
    let dest = layout(&cache).tile_path(&TileCoord::new(3, 1, 2));
    // A non-empty directory at the destination makes every rename fail.
    cache.write("cache/roads/3/1/2.png/keep", "x");

    let started = tokio::time::Instant::now();
    let err = TileWriter::new(0).save(b"abc", &dest).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, SaveError::WriteFailed { .. }));
    // Backoff of 50ms then 100ms between three attempts, none after the last.
    assert!(elapsed >= std::time::Duration::from_millis(150), "{:?}", elapsed);
    assert!(elapsed < std::time::Duration::from_millis(300), "{:?}", elapsed);
    assert_eq!(leftover_temp_files(&cache), 0);
}
