//! Configuration loading integration tests

use std::sync::Arc;
use std::time::Duration;

use vigil::config::{load_config, ConfigError};
use vigil::health::{AdjustableProbe, Executor, Status};

fn write_config(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("vigil-{}-{}.toml", name, std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_configured_probes_registered() {
    let path = write_config(
        "probes",
        r#"
[executor]
timeout_ms = 1000

[scheduler]
enabled = false

[[probes]]
name = "maintenance"
tags = ["lb"]
status = "WARN"
message = "Planned maintenance"

[[probes]]
name = "baseline"
tags = ["os"]
"#,
    );
    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let executor = Executor::new(config.executor_settings());
    assert_eq!(executor.settings().timeout, Duration::from_secs(1));
    for probe_config in &config.probes {
        let probe = AdjustableProbe::with_status(probe_config.status, probe_config.message());
        executor
            .register(probe_config.descriptor().unwrap(), Arc::new(probe))
            .unwrap();
    }

    let report = executor.run("", None).await.unwrap();
    assert_eq!(report.status(), Status::Warn);
    assert_eq!(
        report.get("maintenance").unwrap().result.entries()[0].message(),
        "Planned maintenance"
    );
    assert_eq!(report.get("baseline").unwrap().status(), Status::Ok);
}

#[test]
fn test_load_config_errors() {
    assert!(matches!(
        load_config("/nonexistent/vigil.toml"),
        Err(ConfigError::IoError(_))
    ));

    let path = write_config("broken", "[executor\n");
    let result = load_config(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ConfigError::ParseError(_))));

    let path = write_config("invalid", "[[probes]]\nname = \"x\"\nschedule = \"every:soon\"\n");
    let result = load_config(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
