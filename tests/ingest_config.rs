// tests/ingest_config.rs
use firewatch_timeline::ingest::config::{load_entities_from, DirEntitySource, EntitySource};
use std::fs;

#[tokio::test]
async fn loads_toml_and_json_skipping_bad_files() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join("a_caldor.toml"),
        r#"
id = "caldor"
start = "2021-08-14T00:00:00Z"
end = "2021-10-21T00:00:00Z"
station = "KTVL"
feeds = ["hotspots", "weather"]
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("b_dixie.json"),
        r#"{"id": "dixie", "start": "2021-07-13T00:00:00Z", "feeds": ["flights"],
            "bounds": {"min_lat": 39.8, "min_lon": -121.5, "max_lat": 40.6, "max_lon": -120.5}}"#,
    )
    .unwrap();
    // malformed, duplicate and ignored files
    fs::write(dir.path().join("c_broken.toml"), "id = ").unwrap();
    fs::write(
        dir.path().join("d_dup.json"),
        r#"{"id": "caldor", "start": "2022-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not an entity").unwrap();

    let entities = load_entities_from(dir.path()).unwrap();
    let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["caldor", "dixie"]);
    assert_eq!(entities[0].feeds, vec!["hotspots", "weather"]);
    assert!(entities[0].end.is_some());
    assert!(entities[1].bounds.is_some());
    assert!(entities[1].end.is_none());

    let via_source = DirEntitySource::new(dir.path()).load().await.unwrap();
    assert_eq!(via_source, entities);
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_entities_from(&dir.path().join("nope")).is_err());
}
