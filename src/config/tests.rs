use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.fetch_timeout_ms = Some(2_000);
    raw.logging.level = Some("info".to_string());

    let overrides = SessionOverrides {
        cache_fetch_timeout_ms: Some(500),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_session_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.fetch_timeout, Some(Duration::from_millis(500)));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_router_limits() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.feed.max_posts, 100);
    assert_eq!(settings.feed.max_content_chars, 280);
    assert_eq!(settings.cache.fetch_timeout, Some(Duration::from_secs(10)));
    assert!(settings.cache.retry_failed_on_subscribe);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn zero_timeout_disables_the_deadline() {
    let mut raw = RawSettings::default();
    raw.cache.fetch_timeout_ms = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.fetch_timeout, None);
}

#[test]
fn rejects_zero_feed_limits() {
    let mut raw = RawSettings::default();
    raw.feed.max_posts = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero max_posts");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "feed.max_posts",
            ..
        }
    ));
}

#[test]
fn rejects_unparseable_log_level() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = SessionOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_session_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn parse_snapshot_arguments() {
    let args = CliArgs::parse_from(["chirp", "snapshot", "--feed-max-posts", "5", "/@alice"]);

    match args.command.expect("snapshot command") {
        Command::Snapshot(snapshot) => {
            assert_eq!(snapshot.path, "/@alice");
            assert_eq!(snapshot.overrides.feed_max_posts, Some(5));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_demo_arguments() {
    let args = CliArgs::parse_from([
        "chirp",
        "demo",
        "--message",
        "hi",
        "--cache-retry-failed-on-subscribe",
        "false",
    ]);

    match args.command.expect("demo command") {
        Command::Demo(demo) => {
            assert_eq!(demo.message, "hi");
            assert_eq!(demo.path, "/@alice");
            assert_eq!(demo.overrides.cache_retry_failed_on_subscribe, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn default_to_demo_command() {
    let args = CliArgs::parse_from(["chirp"]);
    let command = args
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));
    assert!(matches!(command, Command::Demo(_)));
}
