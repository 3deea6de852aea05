use super::*;

fn worker_settings(overrides: WorkerOverrides) -> Result<Settings, LoadError> {
    let mut raw = RawSettings::default();
    raw.apply_worker_overrides(&overrides);
    Settings::from_raw(raw)
}

#[test]
fn defaults_describe_a_local_worker() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.render.client_url.as_str(), "http://localhost:5000/");
    assert_eq!(settings.render.max_attempts.get(), MAX_RENDER_ATTEMPTS);
    assert_eq!(settings.render.attempt_timeout, RENDER_TIMEOUT);
    assert_eq!(settings.render.media, MediaType::Print);
    assert!(settings.render.headless);
    assert_eq!(settings.queue.namespace, "render_poster");
    assert_eq!(settings.queue.cancel_channel, "poster_cancel");
    assert_eq!(settings.artifacts.directory, PathBuf::from("output"));
    assert!(settings.cloud.base_url.is_none());
    assert!(settings.worker.name.starts_with("render-worker-"));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.render.max_attempts = Some(5);
    raw.logging.level = Some("info".to_string());

    let overrides = WorkerOverrides {
        render_max_attempts: Some(2),
        logging: LoggingOverrides {
            log_level: Some("debug".to_string()),
            log_json: Some(true),
        },
        ..Default::default()
    };

    raw.apply_worker_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.render.max_attempts.get(), 2);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_attempts_are_rejected() {
    let err = worker_settings(WorkerOverrides {
        render_max_attempts: Some(0),
        ..Default::default()
    })
    .unwrap_err();

    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.max_attempts",
            ..
        }
    ));
}

#[test]
fn unknown_media_is_rejected() {
    let err = worker_settings(WorkerOverrides {
        render_media: Some("tty".to_string()),
        ..Default::default()
    })
    .unwrap_err();

    assert!(matches!(err, LoadError::Invalid { key: "render.media", .. }));
}

#[test]
fn screen_media_is_accepted() {
    let settings = worker_settings(WorkerOverrides {
        render_media: Some("Screen".to_string()),
        ..Default::default()
    })
    .expect("valid settings");

    assert_eq!(settings.render.media, MediaType::Screen);
}

#[test]
fn cancel_channel_must_be_an_identifier() {
    let mut raw = RawSettings::default();
    raw.queue.cancel_channel = Some("poster-cancel".to_string());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "queue.cancel_channel",
            ..
        }
    ));
}

#[test]
fn blank_cloud_url_keeps_artifacts_local() {
    let mut raw = RawSettings::default();
    raw.cloud.base_url = Some("   ".to_string());
    raw.cloud.token = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.cloud.base_url.is_none());
    assert!(settings.cloud.token.is_none());
}

#[test]
fn invalid_cloud_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cloud.base_url = Some("not a url".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cloud.base_url",
            ..
        })
    ));
}

#[test]
fn default_to_worker_command() {
    let args = CliArgs::parse_from(["postergen"]);
    let command = args
        .command
        .unwrap_or(Command::Worker(Box::<WorkerArgs>::default()));
    assert!(matches!(command, Command::Worker(_)));
}

#[test]
fn parse_worker_overrides() {
    let args = CliArgs::parse_from([
        "postergen",
        "worker",
        "--database-url",
        "postgres://override",
        "--render-headless",
        "false",
        "--queue-namespace",
        "posters_eu",
    ]);

    match args.command.expect("worker command") {
        Command::Worker(worker) => {
            assert_eq!(
                worker.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(worker.overrides.render_headless, Some(false));
            assert_eq!(
                worker.overrides.queue.queue_namespace.as_deref(),
                Some("posters_eu")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_build_status_command() {
    let id = uuid::Uuid::new_v4();
    let id_arg = id.to_string();
    let args = CliArgs::parse_from([
        "postergen",
        "builds",
        "--database-url",
        "postgres://example",
        "status",
        id_arg.as_str(),
        "in_production",
    ]);

    match args.command.expect("builds command") {
        Command::Builds(builds) => {
            assert_eq!(
                builds.database.database_url.as_deref(),
                Some("postgres://example")
            );
            match builds.command {
                BuildsCommand::Status {
                    id: parsed,
                    status,
                } => {
                    assert_eq!(parsed, id);
                    assert_eq!(status, crate::domain::types::BuildStatus::InProduction);
                }
                _ => panic!("wrong builds command parsed"),
            }
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_poster_create_command() {
    let build = uuid::Uuid::new_v4();
    let build_arg = build.to_string();
    let args = CliArgs::parse_from([
        "postergen",
        "posters",
        "create",
        "--build",
        build_arg.as_str(),
        "--props",
        "/tmp/props.json",
    ]);

    match args.command.expect("posters command") {
        Command::Posters(posters) => match posters.command {
            PostersCommand::Create { build_id, props } => {
                assert_eq!(build_id, build);
                assert_eq!(props, std::path::Path::new("/tmp/props.json"));
            }
            _ => panic!("wrong posters command parsed"),
        },
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn download_overrides_reach_settings() {
    let id_arg = uuid::Uuid::new_v4().to_string();
    let args = CliArgs::parse_from([
        "postergen",
        "download",
        "--artifacts-directory",
        "/var/lib/posters",
        "--cloud-base-url",
        "https://bucket.example/posters",
        "build",
        id_arg.as_str(),
        "--output",
        "/tmp/build.pdf",
    ]);

    let mut raw = RawSettings::default();
    raw.apply_command_overrides(args.command.as_ref());
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.artifacts.directory, PathBuf::from("/var/lib/posters"));
    assert_eq!(
        settings.cloud.base_url.as_ref().map(Url::as_str),
        Some("https://bucket.example/posters")
    );
}
