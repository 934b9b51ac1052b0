fn main() {
    println!("Run `cargo test -p store-compat` to execute persisted layout tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::PathBuf;

    use chunkwise_protocol::{Session, UploadProgress, UploadStatus};
    use chunkwise_session_store::{JsonFileStore, SessionStore, create_session, is_consistent};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn fixture_text(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&fixture_text(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON numbers so that `40` and `40.0` compare as equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    fn keys(v: &serde_json::Value) -> BTreeSet<String> {
        v.as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    // --- Record layout ---

    #[test]
    fn fixture_session_partial() {
        let session: Session = roundtrip_test("session_partial.json");
        assert!(is_consistent(&session));
        assert_eq!(session.uploaded_count(), 4);
        assert_eq!(session.failed_chunks(), vec![3, 7]);
        assert_eq!(session.pending_chunks(), vec![3, 5, 6, 7, 8, 9]);
        assert_eq!(session.uploaded_bytes(), 4 * 1024 * 1024);
        assert_eq!(session.progress_percent(), 40.0);
        assert!(!session.is_complete());
    }

    #[test]
    fn fixture_session_empty_file() {
        let session: Session = roundtrip_test("session_empty_file.json");
        assert!(is_consistent(&session));
        assert_eq!(session.total_chunks, 1);
        assert_eq!(session.pending_chunks(), vec![0]);
    }

    #[test]
    fn fixture_upload_progress() {
        let progress: UploadProgress = roundtrip_test("upload_progress.json");
        assert_eq!(progress.status, UploadStatus::Stalled);
        assert_eq!(progress.failed_chunks, vec![3, 7]);
        assert_eq!(progress.eta_secs, Some(12.0));
    }

    #[test]
    fn written_record_has_expected_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        store
            .try_save(&create_session("s1", "a.bin", 30, 3, 10))
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("s1.json")).unwrap()).unwrap();
        let fixture = load_fixture("session_partial.json");
        assert_eq!(keys(&written), keys(&fixture));
        assert_eq!(
            keys(&written["chunks"][0]),
            keys(&fixture["chunks"][0]),
            "chunk record keys differ"
        );
    }

    // --- Store behavior on fixture files ---

    #[test]
    fn store_reads_fixture_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());

        let partial = fixture_text("session_partial.json");
        let id = "3f2c9a1e-7b4d-4c8e-9f10-5a6b7c8d9e0f";
        fs::write(tmp.path().join(format!("{id}.json")), &partial).unwrap();
        fs::write(
            tmp.path().join("empty-1.json"),
            fixture_text("session_empty_file.json"),
        )
        .unwrap();

        let loaded = store.load(id).unwrap();
        let expected: Session = serde_json::from_str(&partial).unwrap();
        assert_eq!(loaded, expected);

        // Oldest first.
        let ids: Vec<String> = store.list_all().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![id.to_string(), "empty-1".to_string()]);
    }

    #[test]
    fn store_skips_truncated_table() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        fs::write(
            tmp.path().join("broken-1.json"),
            fixture_text("session_truncated_table.json"),
        )
        .unwrap();

        let session: Session =
            serde_json::from_str(&fixture_text("session_truncated_table.json")).unwrap();
        assert!(!is_consistent(&session));
        assert!(store.load("broken-1").is_none());
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn store_skips_file_named_after_other_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        fs::write(
            tmp.path().join("renamed.json"),
            fixture_text("session_empty_file.json"),
        )
        .unwrap();

        assert!(store.load("renamed").is_none());
        assert!(store.list_all().is_empty());
    }
}
