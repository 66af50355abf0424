use super::*;

#[test]
fn range_header_gives_next_offset() {
    let v = header::HeaderValue::from_static("bytes=0-5242879");
    assert_eq!(next_offset_from_range(Some(&v)).unwrap(), 5_242_880);
    assert_eq!(next_offset_from_range(None).unwrap(), 0);

    let bad = header::HeaderValue::from_static("items=3");
    assert_eq!(
        next_offset_from_range(Some(&bad)).unwrap_err().kind,
        RemoteErrorKind::Protocol
    );
}

#[test]
fn folder_query_escapes_quotes_and_scopes_to_parent() {
    assert_eq!(
        folder_query("it's", Some("root123")),
        "name = 'it\\'s' and mimeType = 'application/vnd.google-apps.folder' \
         and trashed = false and 'root123' in parents"
    );
    assert!(!folder_query("1-10", None).contains("in parents"));
}

#[test]
fn endpoint_overrides_apply() {
    let remote = RemoteConfig {
        api_base: Some("http://localhost:9000".to_string()),
        ..RemoteConfig::default()
    };
    let ep = DriveEndpoints::from_remote(&remote);
    assert_eq!(ep.api_base, "http://localhost:9000");
    assert_eq!(ep.token_url, DriveEndpoints::default().token_url);
}

#[test]
fn from_config_rejects_missing_credentials() {
    let remote = RemoteConfig {
        root_folder_name: "drop".to_string(),
        ..RemoteConfig::default()
    };
    assert!(matches!(
        DriveStore::from_config(&remote),
        Err(ForgeError::Validation(_))
    ));
}
