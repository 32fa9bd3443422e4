use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_when_optional_vars_missing() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("ORGSYNC_BACKEND_URL", "https://project.example.test/"),
        ("ORGSYNC_ANON_KEY", "anon"),
    ]))
    .unwrap();

    assert_eq!(cfg.backend_url, "https://project.example.test");
    assert_eq!(cfg.anon_key, "anon");
    assert_eq!(
        cfg.timeouts,
        Timeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
    assert_eq!(cfg.channel_buffer, DEFAULT_CHANNEL_BUFFER);
}

#[test]
fn overrides_are_parsed() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("ORGSYNC_BACKEND_URL", "http://localhost:54321"),
        ("ORGSYNC_ANON_KEY", "anon"),
        ("ORGSYNC_REQUEST_TIMEOUT_SECS", "42"),
        ("ORGSYNC_CONNECT_TIMEOUT_SECS", " 7 "),
        ("ORGSYNC_CHANNEL_BUFFER", "16"),
    ]))
    .unwrap();

    assert_eq!(cfg.timeouts, Timeouts { request_secs: 42, connect_secs: 7 });
    assert_eq!(cfg.channel_buffer, 16);
}

#[test]
fn unparseable_values_fall_back_to_defaults() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("ORGSYNC_BACKEND_URL", "http://localhost"),
        ("ORGSYNC_ANON_KEY", "anon"),
        ("ORGSYNC_REQUEST_TIMEOUT_SECS", "soon"),
        ("ORGSYNC_CHANNEL_BUFFER", "0"),
    ]))
    .unwrap();

    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    assert_eq!(cfg.channel_buffer, 1);
}

#[test]
fn missing_backend_url_is_an_error() {
    let err = SyncConfig::from_lookup(lookup_from(&[("ORGSYNC_ANON_KEY", "anon")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("ORGSYNC_BACKEND_URL")));
}

#[test]
fn missing_anon_key_is_an_error() {
    let err = SyncConfig::from_lookup(lookup_from(&[("ORGSYNC_BACKEND_URL", "https://x.test")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("ORGSYNC_ANON_KEY")));
}

#[test]
fn non_http_backend_url_is_rejected() {
    let err = SyncConfig::from_lookup(lookup_from(&[
        ("ORGSYNC_BACKEND_URL", "ftp://x.test"),
        ("ORGSYNC_ANON_KEY", "anon"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { var: "ORGSYNC_BACKEND_URL", .. }));
}
