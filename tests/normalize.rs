mod common;

use prcov::detect::Format;
use prcov::error::Error;
use prcov::normalize::Normalizer;

/// Read file from disk, detect format by name, parse.
#[test]
fn lcov_detected_by_extension() {
    let (_dir, path) = common::write_artifact("coverage.info", b"SF:src/lib.js\nDA:1,3\nDA:2,0\nend_of_record\n");

    let files = prcov::normalize::parse(&path).unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(common::hits(&files[0]), vec![(1, 3), (2, 0)]);
}

#[test]
fn lcov_detected_by_name() {
    let (_dir, path) = common::write_artifact("lcov-report", b"SF:src/lib.js\nDA:1,1\nend_of_record\n");

    let files = prcov::normalize::parse(&path).unwrap();

    assert_eq!(files.len(), 1);
}

#[test]
fn format_override_skips_detection() {
    // lcov content behind a name that detects as nothing
    let (_dir, path) = common::write_artifact("data.txt", b"SF:src/lib.js\nDA:1,1\nend_of_record\n");

    assert!(matches!(
        prcov::normalize::parse(&path),
        Err(Error::UnsupportedFormat(_))
    ));

    let files = Normalizer::default()
        .with_format(Some(Format::Lcov))
        .parse(&path)
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[test]
fn missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lcov.info");

    let err = prcov::normalize::parse(&path).unwrap_err();

    assert!(matches!(err, Error::FileNotFound(ref p) if p == &path), "{err}");
}

#[test]
fn unsupported_format_fails() {
    let (_dir, path) = common::write_artifact("coverage.xml", b"<?xml version=\"1.0\"?><coverage/>");

    let err = prcov::normalize::parse(&path).unwrap_err();

    assert!(matches!(err, Error::UnsupportedFormat(_)), "{err}");
}

#[test]
fn malformed_lcov_fails() {
    let (_dir, path) = common::write_artifact("lcov.info", b"SF:a.js\nDA:x,y\nend_of_record\n");

    let err = prcov::normalize::parse(&path).unwrap_err();

    assert!(matches!(err, Error::MalformedArtifact { format: "lcov", .. }), "{err}");
}

#[test]
fn empty_coverage_file() {
    let (_dir, path) = common::write_artifact("empty.lcov", b"TN:test\n");

    let files = prcov::normalize::parse(&path).unwrap();

    assert!(files.is_empty());
}
