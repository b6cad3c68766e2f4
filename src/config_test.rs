use super::*;

const URL: &str = "https://abcd.supabase.co";

// =============================================================================
// Config::new
// =============================================================================

#[test]
fn new_trims_trailing_slash_and_applies_defaults() {
    let cfg = Config::new("https://abcd.supabase.co/", "anon", "google").unwrap();
    assert_eq!(cfg.supabase_url, URL);
    assert_eq!(cfg.anon_key, "anon");
    assert_eq!(cfg.provider, OAuthProvider::Google);
    assert_eq!(cfg.callback_port, DEFAULT_CALLBACK_PORT);
    assert_eq!(cfg.session_file, PathBuf::from(DEFAULT_SESSION_FILE));
}

#[test]
fn new_rejects_empty_url() {
    let err = Config::new("  ", "anon", "google").unwrap_err();
    assert!(matches!(err, ConfigError::Missing("SUPABASE_URL")));
}

#[test]
fn new_rejects_unparseable_url() {
    let err = Config::new("not a url", "anon", "google").unwrap_err();
    assert!(err.to_string().contains("invalid supabase url"));
}

#[test]
fn new_rejects_non_http_scheme() {
    let err = Config::new("ftp://abcd.supabase.co", "anon", "google").unwrap_err();
    assert!(err.to_string().contains("scheme must be http or https"));
}

#[test]
fn new_rejects_empty_key() {
    let err = Config::new(URL, "", "google").unwrap_err();
    assert!(matches!(err, ConfigError::Missing("SUPABASE_ANON_KEY")));
}

#[test]
fn new_rejects_unknown_provider() {
    let err = Config::new(URL, "anon", "myspace").unwrap_err();
    assert_eq!(err.to_string(), "unknown oauth provider: myspace");
}

#[test]
fn builders_override_port_and_session_file() {
    let cfg = Config::new(URL, "anon", "github")
        .unwrap()
        .with_callback_port(4010)
        .with_session_file("/tmp/s.json");
    assert_eq!(cfg.callback_port, 4010);
    assert_eq!(cfg.session_file, PathBuf::from("/tmp/s.json"));
    assert_eq!(callback_url(cfg.callback_port), "http://localhost:4010/auth/callback");
}

// =============================================================================
// env_parse: unique env var names to avoid races with parallel tests.
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__TEST_SB_MISSING_1931__", 25);
    assert_eq!(val, 25);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_SB_VALID_1932__", " 40 ") };
    let val: u64 = env_parse("__TEST_SB_VALID_1932__", 25);
    assert_eq!(val, 40);
    unsafe { std::env::remove_var("__TEST_SB_VALID_1932__") };
}

#[test]
fn env_parse_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_SB_INVALID_1933__", "soon") };
    let val: i64 = env_parse("__TEST_SB_INVALID_1933__", 60);
    assert_eq!(val, 60);
    unsafe { std::env::remove_var("__TEST_SB_INVALID_1933__") };
}
