mod common;

use prcov::normalize::Normalizer;

#[test]
fn parse_fixture_with_root() {
    let normalizer = Normalizer::default().with_root(Some("/home/ci/project".into()));
    let files = normalizer
        .parse(&common::fixture("sample_istanbul.json"))
        .unwrap();

    // The "total" summary entry is not a file.
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.path != "total"));

    let lib = files.iter().find(|f| f.path == "src/lib.js").unwrap();
    assert_eq!(
        common::hits(lib),
        vec![(1, 5), (2, 5), (3, 0), (4, 1), (6, 2)]
    );
}

#[test]
fn relative_keys_pass_through() {
    let input = br#"{
        "./src/app.js": {
            "statementMap": {
                "0": { "start": { "line": 1, "column": 0 }, "end": { "line": 1, "column": 30 } },
                "1": { "start": { "line": 2, "column": 0 }, "end": { "line": 2, "column": 20 } },
                "2": { "start": { "line": 3, "column": 0 }, "end": { "line": 3, "column": 15 } }
            },
            "s": { "0": 5, "1": 3, "2": 0 },
            "branchMap": {},
            "b": {},
            "fnMap": {},
            "f": {}
        }
    }"#;
    let (_dir, path) = common::write_artifact("coverage-final.json", input);

    let files = prcov::normalize::parse(&path).unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "src/app.js");
    assert_eq!(common::hits(&files[0]), vec![(1, 5), (2, 3), (3, 0)]);
}

#[test]
fn corrupt_json_is_fatal() {
    let (_dir, path) = common::write_artifact("coverage-final.json", b"{ \"a.js\": ");

    let err = prcov::normalize::parse(&path).unwrap_err();

    assert!(matches!(err, prcov::error::Error::MalformedArtifact { .. }), "{err}");
}
