//! Tests for the memory-queue-cli library module.

use super::*;
use std::io::Write as _;

fn fast_config() -> QueueConfig {
    QueueConfig {
        listen_interval_ms: 10,
        receive_check_interval_ms: 10,
        ..Default::default()
    }
}

fn demo_options(messages: usize, listen: bool) -> DemoOptions {
    DemoOptions {
        queue: "demo".to_string(),
        messages,
        listen,
        wait: Duration::from_millis(500),
    }
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

mod parsing {
    use super::*;

    #[test]
    fn test_demo_defaults() {
        let cli = Cli::try_parse_from(["memq", "demo"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);

        match cli.command {
            Commands::Demo {
                queue,
                messages,
                listen,
                wait_ms,
            } => {
                assert_eq!(queue, "demo");
                assert_eq!(messages, 3);
                assert!(!listen);
                assert_eq!(wait_ms, 1000);
            }
            _ => panic!("Expected Demo command"),
        }
    }

    #[test]
    fn test_demo_arguments() {
        let cli = Cli::try_parse_from([
            "memq",
            "--json-logs",
            "demo",
            "--queue",
            "orders",
            "--messages",
            "10",
            "--listen",
        ])
        .unwrap();

        assert!(cli.json_logs);
        match cli.command {
            Commands::Demo {
                queue,
                messages,
                listen,
                ..
            } => {
                assert_eq!(queue, "orders");
                assert_eq!(messages, 10);
                assert!(listen);
            }
            _ => panic!("Expected Demo command"),
        }
    }

    #[test]
    fn test_config_command() {
        let cli = Cli::try_parse_from(["memq", "config", "--show", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Config { show, format } => {
                assert!(show);
                assert_eq!(format, ConfigFormat::Json);
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["memq", "serve"]).is_err());
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let configuration = CliError::Configuration(ConfigurationError::Invalid {
            message: "bad".to_string(),
        });
        assert_eq!(configuration.exit_code(), 1);

        let queue = CliError::Queue(QueueError::NotOpened {
            queue_name: "demo".to_string(),
        });
        assert_eq!(queue.exit_code(), 2);

        let argument = CliError::InvalidArgument {
            arg: "messages".to_string(),
            message: "must be greater than 0".to_string(),
        };
        assert_eq!(argument.exit_code(), 3);
    }
}

mod demo {
    use super::*;

    #[tokio::test]
    async fn test_demo_with_receive() {
        let report = run_demo(fast_config(), &demo_options(3, false))
            .await
            .unwrap();

        assert_eq!(report.queue, "demo");
        assert_eq!(report.sent, 3);
        assert_eq!(report.processed, 3);
        assert!(report
            .counters
            .contains(&("queue.demo.sent_messages".to_string(), 3)));
        assert!(report
            .counters
            .contains(&("queue.demo.received_messages".to_string(), 3)));
    }

    #[tokio::test]
    async fn test_demo_with_listen() {
        let report = run_demo(fast_config(), &demo_options(2, true))
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert!(report
            .counters
            .contains(&("queue.demo.received_messages".to_string(), 2)));
    }

    #[tokio::test]
    async fn test_demo_listen_with_unbounded_wait() {
        let options = DemoOptions {
            wait: Duration::MAX,
            ..demo_options(1, true)
        };
        let report = run_demo(fast_config(), &options).await.unwrap();

        assert_eq!(report.processed, 1);
    }

    #[tokio::test]
    async fn test_demo_receive_with_unbounded_wait() {
        let options = DemoOptions {
            wait: Duration::MAX,
            ..demo_options(2, false)
        };
        let report = run_demo(fast_config(), &options).await.unwrap();

        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn test_demo_rejects_zero_messages() {
        let result = run_demo(fast_config(), &demo_options(0, false)).await;
        assert!(matches!(result, Err(CliError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_demo_rejects_bad_queue_name() {
        let options = DemoOptions {
            queue: "bad name".to_string(),
            ..demo_options(1, false)
        };
        let result = run_demo(fast_config(), &options).await;
        assert!(matches!(result, Err(CliError::InvalidArgument { arg, .. }) if arg == "queue"));
    }

    #[test]
    fn test_report_output() {
        let report = DemoReport {
            queue: "demo".to_string(),
            sent: 1,
            processed: 1,
            counters: vec![("queue.demo.sent_messages".to_string(), 1)],
        };

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "queue: demo\nsent: 1\nprocessed: 1\nqueue.demo.sent_messages = 1\n"
        );
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_render_yaml() {
        let rendered = render_config(&QueueConfig::default(), &ConfigFormat::Yaml).unwrap();
        assert!(rendered.contains("listen_interval_ms: 1000"));
        assert!(rendered.contains("receive_check_interval_ms: 100"));
    }

    #[test]
    fn test_render_masks_password() {
        let mut config = QueueConfig::default();
        config.credential.username = Some("user".to_string());
        config.credential.password = Some("hunter2".to_string());

        let rendered = render_config(&config, &ConfigFormat::Json).unwrap();
        assert!(rendered.contains("<REDACTED>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_config_command_reads_file() {
        let file = yaml_file("listen_interval_ms: 250\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["memq", "--config", path, "config", "--show"]).unwrap();

        let mut out = Vec::new();
        execute(&cli, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("listen_interval_ms: 250"));
    }

    #[tokio::test]
    async fn test_config_command_validates() {
        let file = yaml_file("receive_check_interval_ms: 0\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["memq", "--config", path, "config"]).unwrap();

        let mut out = Vec::new();
        let result = execute(&cli, &mut out).await;
        assert!(matches!(result, Err(CliError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_missing_config_file_fails() {
        let cli = Cli::try_parse_from([
            "memq",
            "--config",
            "/nonexistent/memq-config.yaml",
            "config",
        ])
        .unwrap();

        let mut out = Vec::new();
        let result = execute(&cli, &mut out).await;
        assert!(matches!(result, Err(CliError::Configuration(_))));
    }
}
