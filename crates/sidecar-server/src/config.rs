//! Configuration management for the sidecar
//!
//! Sources, lowest precedence first:
//! 1. `conf/application.yml` (optional, path set with `--config`)
//! 2. environment variables `SIDECAR__<SECTION>__<KEY>`, with `_` inside a
//!    key segment read as `-` (`SIDECAR__SIDECAR__HEALTH_URI` sets `sidecar.health-uri`)
//! 3. command line overrides

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use config::{Case, Config, Environment, File, FileFormat, Map};
use serde::de::DeserializeOwned;

use sidecar_common::SidecarError;
use sidecar_consul_client::ConsulClientConfig;
use sidecar_registration::{DiscoveryProperties, HeartbeatProperties, SidecarProperties};

use crate::logging::LoggingConfig;

pub const SIDECAR_ENABLED_PROPERTY: &str = "spring.cloud.consul.sidecar.enabled";
pub const APPLICATION_NAME_PROPERTY: &str = "spring.application.name";
pub const SIDECAR_PREFIX: &str = "sidecar";
pub const DISCOVERY_PREFIX: &str = "spring.cloud.consul.discovery";
pub const HEARTBEAT_PREFIX: &str = "spring.cloud.consul.discovery.heartbeat";
pub const CONSUL_HOST_PROPERTY: &str = "spring.cloud.consul.host";
pub const CONSUL_PORT_PROPERTY: &str = "spring.cloud.consul.port";
pub const CONSUL_SCHEME_PROPERTY: &str = "spring.cloud.consul.scheme";
pub const INSTANCE_HOSTNAME_PROPERTY: &str = "consul.instance.hostname";
pub const INSTANCE_HOSTNAME_ENV: &str = "CONSUL_INSTANCE_HOSTNAME";
pub const SERVER_ADDRESS_PROPERTY: &str = "server.address";
pub const SERVER_PORT_PROPERTY: &str = "server.port";

const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_CONSUL_PORT: u16 = 8500;

/// Command line arguments for the sidecar
#[derive(Debug, Default, Parser)]
#[command(name = "consul-sidecar", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Port of the co-located application
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Host name to register
    #[arg(long = "hostname")]
    pub hostname: Option<String>,
    /// Port the sidecar HTTP endpoints listen on
    #[arg(long = "server-port")]
    pub server_port: Option<u16>,
    #[arg(long = "consul-host")]
    pub consul_host: Option<String>,
    #[arg(long = "consul-port")]
    pub consul_port: Option<u16>,
    #[arg(long = "acl-token", env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub acl_token: Option<String>,
}

/// Application configuration loaded from config files, environment and CLI
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::load_with_env(cli, None)
    }

    /// Load with an explicit environment instead of the process environment
    pub fn load_with_env(cli: &Cli, env: Option<Map<String, String>>) -> anyhow::Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder()
            .add_source(File::from(path.as_path()).required(cli.config.is_some()))
            .add_source(
                Environment::with_prefix("SIDECAR")
                    .separator("__")
                    .convert_case(Case::Kebab)
                    .try_parsing(true)
                    .source(env),
            );

        if let Some(v) = cli.port {
            builder = builder.set_override("sidecar.port", i64::from(v))?;
        }
        if let Some(v) = &cli.hostname {
            builder = builder.set_override("sidecar.hostname", v.as_str())?;
        }
        if let Some(v) = cli.server_port {
            builder = builder.set_override(SERVER_PORT_PROPERTY, i64::from(v))?;
        }
        if let Some(v) = &cli.consul_host {
            builder = builder.set_override(CONSUL_HOST_PROPERTY, v.as_str())?;
        }
        if let Some(v) = cli.consul_port {
            builder = builder.set_override(CONSUL_PORT_PROPERTY, i64::from(v))?;
        }
        if let Some(v) = &cli.acl_token {
            builder = builder.set_override(format!("{}.acl-token", DISCOVERY_PREFIX), v.as_str())?;
        }

        let config = builder
            .build()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        Ok(Configuration { config })
    }

    /// Build from an inline YAML document
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(Configuration { config })
    }

    /// Deserialize a section, falling back to defaults when it is absent
    fn section<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, SidecarError> {
        match self.config.get::<T>(key) {
            Ok(value) => Ok(value),
            Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(SidecarError::ConfigError(format!("{}: {}", key, e))),
        }
    }

    // ========================================================================
    // Sidecar Configuration
    // ========================================================================

    pub fn sidecar_enabled(&self) -> bool {
        self.config.get_bool(SIDECAR_ENABLED_PROPERTY).unwrap_or(true)
    }

    pub fn application_name(&self) -> Option<String> {
        self.config
            .get_string(APPLICATION_NAME_PROPERTY)
            .ok()
            .filter(|name| !name.is_empty())
    }

    pub fn sidecar_properties(&self) -> Result<SidecarProperties, SidecarError> {
        let props: SidecarProperties = self.section(SIDECAR_PREFIX)?;
        props.validate()?;
        Ok(props)
    }

    pub fn discovery_properties(&self) -> Result<DiscoveryProperties, SidecarError> {
        let mut props: DiscoveryProperties = self.section(DISCOVERY_PREFIX)?;
        props.application_name = self.application_name();
        Ok(props)
    }

    pub fn heartbeat_properties(&self) -> Result<HeartbeatProperties, SidecarError> {
        let props: HeartbeatProperties = self.section(HEARTBEAT_PREFIX)?;
        props.validate()?;
        Ok(props)
    }

    /// Host name override: `consul.instance.hostname`, then `CONSUL_INSTANCE_HOSTNAME`
    pub fn env_hostname_override(&self) -> String {
        self.hostname_override_from(std::env::var(INSTANCE_HOSTNAME_ENV).ok())
    }

    fn hostname_override_from(&self, env_value: Option<String>) -> String {
        self.config
            .get_string(INSTANCE_HOSTNAME_PROPERTY)
            .ok()
            .filter(|h| !h.is_empty())
            .or(env_value)
            .unwrap_or_default()
    }

    // ========================================================================
    // Consul Agent Configuration
    // ========================================================================

    pub fn consul_host(&self) -> String {
        self.config
            .get_string(CONSUL_HOST_PROPERTY)
            .unwrap_or("localhost".to_string())
    }

    pub fn consul_port(&self) -> Result<u16, SidecarError> {
        self.port(CONSUL_PORT_PROPERTY, DEFAULT_CONSUL_PORT)
    }

    pub fn consul_scheme(&self) -> String {
        self.config
            .get_string(CONSUL_SCHEME_PROPERTY)
            .unwrap_or("http".to_string())
    }

    pub fn consul_client_config(
        &self,
        discovery: &DiscoveryProperties,
    ) -> Result<ConsulClientConfig, SidecarError> {
        Ok(ConsulClientConfig::new(&self.consul_host(), self.consul_port()?)
            .with_scheme(&self.consul_scheme())
            .with_acl_token(discovery.acl_token.clone()))
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS_PROPERTY)
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> Result<u16, SidecarError> {
        self.port(SERVER_PORT_PROPERTY, DEFAULT_SERVER_PORT)
    }

    /// Port under `key`, rejecting values outside 0..=65535
    fn port(&self, key: &str, default: u16) -> Result<u16, SidecarError> {
        match self.config.get_int(key) {
            Ok(value) => u16::try_from(value).map_err(|_| SidecarError::InvalidProperty {
                key: key.to_string(),
                message: format!("{} is not a valid port", value),
            }),
            Err(config::ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(SidecarError::ConfigError(format!("{}: {}", key, e))),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }
}
