use anyhow::{Context, Result};
use beacon_rpc::{start_server, AppState};
use beacon_storage::{import_bundle, ChainStateProvider, SledStorage, StateBundle, StateStore};
use beacon_validator_resolution::QueryService;
use clap::{value_parser, Arg, ArgAction, Command};
use config::{Config, File as ConfigFile};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

use version::{git_commit_hash, BEACON_NODE_VERSION};

const DEFAULT_CONFIG_PATH: &str = "config/beacon-node.toml";
const LOG_FORMATS: [&str; 2] = ["pretty", "plain"];

/// Application configuration
#[derive(Debug, Clone)]
struct AppConfig {
    config_path: Option<PathBuf>,
    node_id: String,

    // Network
    rpc_host: String,
    rpc_port: u16,

    // Storage
    data_dir: String,
    import_bundle: Option<PathBuf>,
    export_bundle: Option<PathBuf>,

    // Observability
    prometheus_enabled: bool,

    // Logging
    log_level: String,
    log_format: String,
}

impl AppConfig {
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();

        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }

        builder = builder.add_source(config::Environment::with_prefix("BEACON"));

        let config = builder.build()?;

        Ok(Self {
            config_path: resolved_path,
            node_id: get_string_value(&config, &["node_id", "node.id"])
                .unwrap_or_else(|| "beacon-node".to_string()),
            rpc_host: get_string_value(&config, &["rpc_host", "rpc.host"])
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            rpc_port: get_string_value(&config, &["rpc_port", "rpc.port"])
                .unwrap_or_else(|| "5052".to_string())
                .parse()
                .context("rpc_port must be a port number")?,
            data_dir: get_string_value(&config, &["data_dir", "storage.data_dir"])
                .unwrap_or_else(|| "./data".to_string()),
            import_bundle: get_string_value(&config, &["import_bundle", "storage.import_bundle"])
                .map(PathBuf::from),
            export_bundle: None,
            prometheus_enabled: get_bool_value(
                &config,
                &["prometheus_enabled", "metrics.prometheus_enabled"],
                true,
            ),
            log_level: get_string_value(&config, &["log_level", "log.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(&config, &["log_format", "log.format"])
                .unwrap_or_else(|| "pretty".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            anyhow::bail!("node_id must not be empty");
        }
        if self.data_dir.trim().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("rpc_port must be greater than zero");
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            anyhow::bail!(
                "Unknown log_format '{}' (expected one of: {})",
                self.log_format,
                LOG_FORMATS.join(", ")
            );
        }
        Ok(())
    }

    fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("db")
    }

    fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = data_dir.clone();
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if let Some(bundle) = matches.get_one::<String>("import") {
        config.import_bundle = Some(PathBuf::from(bundle));
    }

    if let Some(bundle) = matches.get_one::<String>("export") {
        config.export_bundle = Some(PathBuf::from(bundle));
    }

    if matches.get_flag("disable-metrics") {
        config.prometheus_enabled = false;
    }
}

fn build_cli() -> Command {
    Command::new("beacon-node")
        .version(BEACON_NODE_VERSION)
        .about("Beacon validator query node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(LOG_FORMATS)
                .help("Select log output format"),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override RPC bind host"),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port"),
        )
        .arg(
            Arg::new("import")
                .long("import")
                .value_name("FILE")
                .help("Import a state bundle into the database before serving"),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .value_name("FILE")
                .help("Write the stored states to a bundle file and exit"),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Disable the Prometheus metrics exporter"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config_with_overrides(&matches)?;

    init_logging(&config)?;

    info!(
        "Starting beacon node {} ({} commit {})",
        config.node_id,
        BEACON_NODE_VERSION,
        git_commit_hash()
    );
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: (built-in defaults)");
    }

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir))?;
    let storage = Arc::new(SledStorage::new(config.db_path())?);
    info!(
        "Storage opened at {} ({} states)",
        config.db_path().display(),
        storage.state_count()
    );

    if let Some(path) = &config.import_bundle {
        let bundle = StateBundle::load(path)?;
        let summary = import_bundle(storage.as_ref(), bundle)
            .with_context(|| format!("failed to import bundle {}", path.display()))?;
        storage.flush()?;
        info!(
            "Imported {} states from {} (head slot {:?})",
            summary.states,
            path.display(),
            summary.head_slot
        );
    }

    if let Some(path) = &config.export_bundle {
        let bundle = storage.export_bundle()?;
        bundle.save(path)?;
        info!("Exported {} states to {}", bundle.states.len(), path.display());
        return Ok(());
    }

    let prometheus_handle = init_metrics(&config);

    let chain: Arc<dyn ChainStateProvider> = storage.clone();
    let store: Arc<dyn StateStore> = storage;
    let mut app_state = AppState::new(config.node_id.clone(), QueryService::new(chain, store));
    if let Some(handle) = prometheus_handle {
        app_state = app_state.with_prometheus(handle);
    }

    let rpc_addr = config.rpc_addr();
    tokio::select! {
        result = start_server(app_state, &rpc_addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Beacon node stopped");
    Ok(())
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!(
                "validator_api_requests_total",
                "Validator API requests by endpoint and outcome"
            );
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "plain" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("beacon-node.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn config_file_values_are_loaded() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
node_id = "test-beacon"
data_dir = "/tmp/beacon-test"
log_format = "plain"

[rpc]
host = "0.0.0.0"
port = 9596
"#,
        );
        let config = AppConfig::load(Some(path.to_str().expect("utf8 path"))).unwrap();

        assert_eq!(config.node_id, "test-beacon");
        assert_eq!(config.rpc_host, "0.0.0.0");
        assert_eq!(config.rpc_port, 9596);
        assert_eq!(config.data_dir, "/tmp/beacon-test");
        assert_eq!(config.log_format, "plain");
        assert!(config.prometheus_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = AppConfig::load(Some("/nonexistent/beacon-node.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"), "unexpected error: {err}");
    }

    #[test]
    fn cli_overrides_config_values() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "rpc_port = 9000\n");
        let matches = build_cli().get_matches_from([
            "beacon-node",
            "--config",
            path.to_str().expect("utf8 path"),
            "--rpc-port",
            "7000",
            "--data-dir",
            "/var/lib/beacon",
            "--import",
            "bundle.json",
            "--disable-metrics",
        ]);
        let config = load_config_with_overrides(&matches).unwrap();

        assert_eq!(config.rpc_port, 7000);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/beacon/db"));
        assert_eq!(config.import_bundle, Some(PathBuf::from("bundle.json")));
        assert!(!config.prometheus_enabled);
        assert_eq!(config.rpc_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "rpc_port = 0\n");
        let config = AppConfig::load(Some(path.to_str().expect("utf8 path"))).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rpc_port"), "unexpected error: {err}");

        let path = write_config(&dir, "log_format = \"json\"\n");
        let config = AppConfig::load(Some(path.to_str().expect("utf8 path"))).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"), "unexpected error: {err}");
    }
}
