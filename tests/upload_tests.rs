//! Integration tests for upload orchestration pieces
//!
//! Part splitting, destination keys, progress aggregation and the
//! pre-upload image transform.

use prism::store::transform::maybe_reencode;
use prism::store::upload::{destination_key, part_ranges, ProgressTracker};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

#[test]
fn test_twelve_mib_file_makes_three_parts() {
    let ranges = part_ranges(12 * MIB, 5 * MIB);
    assert_eq!(ranges.len(), 3);

    // contiguous and covering
    let mut expected_offset = 0;
    for (offset, len) in &ranges {
        assert_eq!(*offset, expected_offset);
        expected_offset += len;
    }
    assert_eq!(expected_offset, 12 * MIB);
}

#[test]
fn test_single_part_boundary() {
    assert_eq!(part_ranges(5 * MIB, 5 * MIB), vec![(0, 5 * MIB)]);
    assert_eq!(part_ranges(5 * MIB + 1, 5 * MIB).len(), 2);
}

#[test]
fn test_destination_key_rules() {
    assert_eq!(destination_key("images", "cat.png"), "images/cat.png");
    assert_eq!(destination_key("images/", "cat.png"), "images/cat.png");
    assert_eq!(destination_key("", "cat.png"), "cat.png");
    assert_eq!(destination_key("a/b", "cat.png"), "a/b/cat.png");
}

#[test]
fn test_progress_is_monotone_and_caps_at_hundred() {
    let mut tracker = ProgressTracker::new(12 * MIB);
    let mut last = 0;
    // parts complete out of order; only the byte total matters
    for len in [5 * MIB, 2 * MIB, 5 * MIB] {
        let (percent, speed) = tracker.record(len);
        assert!(percent >= last);
        assert!(speed > 0.0);
        last = percent;
    }
    assert_eq!(last, 100);
}

#[test]
fn test_progress_rounding_never_reports_hundred_early() {
    // 996/1000 rounds to 100 but the task is not done yet
    let mut tracker = ProgressTracker::new(1000);
    let (percent, _) = tracker.record(996);
    assert_eq!(percent, 99);
    let (percent, _) = tracker.record(4);
    assert_eq!(percent, 100);
}

#[tokio::test]
async fn test_transform_reencodes_png_to_webp() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tiny.png");
    image::RgbaImage::from_pixel(4, 4, image::Rgba([120, 40, 200, 255]))
        .save(&source)
        .unwrap();

    let transformed = maybe_reencode(&source, 0.8).await.expect("png should convert");
    assert_eq!(transformed.file_name, "tiny.webp");
    assert!(!transformed.data.is_empty());
    // RIFF container magic
    assert_eq!(&transformed.data[..4], b"RIFF");
}

#[tokio::test]
async fn test_transform_falls_back_on_non_images() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("notes.txt");
    tokio::fs::write(&source, "not an image").await.unwrap();
    assert!(maybe_reencode(&source, 0.8).await.is_none());
}

#[tokio::test]
async fn test_transform_falls_back_on_corrupt_image() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("broken.png");
    tokio::fs::write(&source, b"\x89PNG but not really").await.unwrap();
    assert!(maybe_reencode(&source, 0.8).await.is_none());
}
