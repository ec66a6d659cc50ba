//! Configuration for storebench.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `SB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `SB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `SB__OBJECT_COUNT=50` sets the number of objects per run
//! - `SB__BACKEND__TYPE=memory` selects the in-memory backend
//! - `SB__BACKEND__ENDPOINT=http://localhost:9000` sets the S3 endpoint
//!
//! # YAML Configuration File
//!
//! ```yaml
//! namespace: test
//! object_size: 2 MiB
//! object_count: 1000
//!
//! backend:
//!   type: s3compatible
//!   endpoint: http://localhost:9000
//!   access_key: minioadmin
//!   secret_key: minioadmin
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use storebench_backend::S3CompatibleBackendConfig;
use tracing::level_filters::LevelFilter;

use crate::driver::DriverConfig;
use crate::verify::VerifyMode;
use crate::workload::{HierarchySpec, WorkloadSpec};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SB__";

/// Newtype around `String` that keeps secrets out of `Debug` output.
///
/// Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// The secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Backend the workloads run against.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is
/// used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Process-local store (type `"memory"`).
    ///
    /// Useful to check configuration and workloads without a server. Throughput figures only
    /// reflect the harness itself.
    Memory {},

    /// S3-compatible service (type `"s3compatible"`), such as MinIO or RustFS.
    ///
    /// Credentials fall back to `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` when unset.
    ///
    /// # Example
    ///
    /// ```yaml
    /// backend:
    ///   type: s3compatible
    ///   endpoint: http://localhost:9000
    /// ```
    S3Compatible {
        /// Endpoint URL.
        ///
        /// # Environment Variable
        ///
        /// `SB__BACKEND__ENDPOINT`
        endpoint: String,

        /// Signing region.
        ///
        /// # Default
        ///
        /// `us-east-1`
        #[serde(default = "default_region")]
        region: String,

        /// Address buckets below the endpoint path instead of as subdomains.
        ///
        /// # Default
        ///
        /// `true`
        #[serde(default = "default_true")]
        path_style: bool,

        /// Access key of the credential pair.
        #[serde(default)]
        access_key: Option<String>,

        /// Secret key of the credential pair. Redacted from logs.
        ///
        /// # Environment Variable
        ///
        /// `SB__BACKEND__SECRET_KEY`
        #[serde(default)]
        secret_key: Option<SecretBox<ConfigSecret>>,

        /// Upper bound for a single HTTP request.
        ///
        /// # Default
        ///
        /// `30s`
        #[serde(default = "default_request_timeout", with = "humantime_serde")]
        request_timeout: Duration,

        /// Whether the service guarantees read-after-write consistency.
        ///
        /// When `false`, read runs warn that failures may be caused by eventual consistency.
        ///
        /// # Default
        ///
        /// `true`
        #[serde(default = "default_true")]
        read_after_write: bool,
    },
}

fn default_region() -> String {
    "us-east-1".into()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Storage {
    /// Settings for an S3-compatible backend, `None` for the in-memory backend.
    pub fn s3_config(&self) -> Option<S3CompatibleBackendConfig> {
        match self {
            Storage::Memory {} => None,
            Storage::S3Compatible {
                endpoint,
                region,
                path_style,
                access_key,
                secret_key,
                request_timeout,
                read_after_write,
            } => Some(S3CompatibleBackendConfig {
                endpoint: endpoint.clone(),
                region: region.clone(),
                path_style: *path_style,
                access_key: access_key.clone(),
                secret_key: secret_key
                    .as_ref()
                    .map(|secret| secret.expose_secret().as_str().to_owned()),
                request_timeout: *request_timeout,
                read_after_write: *read_after_write,
            }),
        }
    }
}

/// Shape of the hierarchy workload.
///
/// Used in: [`Config::hierarchy`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Hierarchy {
    /// Path of the root group, relative to the namespace.
    ///
    /// # Default
    ///
    /// `hierarchy`
    pub root: String,

    /// Number of groups below the root.
    ///
    /// # Default
    ///
    /// `100`
    pub top_groups: u32,

    /// Number of subgroups per top-level group.
    ///
    /// # Default
    ///
    /// `10`
    pub sub_groups: u32,

    /// Number of leaves per subgroup.
    ///
    /// # Default
    ///
    /// `200`
    pub leaves: u32,

    /// Size of every leaf.
    ///
    /// # Default
    ///
    /// `1 KiB`
    pub leaf_size: ByteSize,

    /// Delete the first subgroup after listing and verify the listing again.
    ///
    /// # Default
    ///
    /// `true`
    pub delete_subgroup: bool,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self {
            root: "hierarchy".into(),
            top_groups: 100,
            sub_groups: 10,
            leaves: 200,
            leaf_size: ByteSize::kib(1),
            delete_subgroup: true,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `SB__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`].
    ///
    /// # Default
    ///
    /// `Auto`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Backend the workloads run against.
    ///
    /// # Default
    ///
    /// S3-compatible service at `http://localhost:9000`
    pub backend: Storage,

    /// Namespace (bucket) to run in. Created if it does not exist.
    ///
    /// # Default
    ///
    /// `test`
    pub namespace: String,

    /// Prefix of all keys of the throughput workload.
    ///
    /// # Default
    ///
    /// `benchblob`
    pub key_prefix: String,

    /// Size of every object in the throughput workload. Must be positive.
    ///
    /// # Default
    ///
    /// `2 MiB`
    pub object_size: ByteSize,

    /// Number of objects in the throughput workload.
    ///
    /// # Default
    ///
    /// `1000`
    pub object_count: u64,

    /// Maximum number of operations in flight. `1` issues operations strictly sequentially.
    ///
    /// # Default
    ///
    /// `1`
    pub concurrency: usize,

    /// Number of operations between two progress lines.
    ///
    /// # Default
    ///
    /// `100`
    pub checkpoint_interval: u64,

    /// Upper bound for a single backend call.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,

    /// How read-backs are verified, `content` or `size`.
    ///
    /// Content verification keeps every written payload in memory until the read run ends,
    /// which is `object_size * object_count` bytes.
    ///
    /// # Default
    ///
    /// `content` for the `memory` backend, `size` for `s3compatible`. See
    /// [`verify_mode`](Self::verify_mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyMode>,

    /// Delete the throughput workload's objects after reading them back.
    ///
    /// # Default
    ///
    /// `false`
    pub cleanup: bool,

    /// Shape of the hierarchy workload.
    pub hierarchy: Hierarchy,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Storage::S3Compatible {
                endpoint: "http://localhost:9000".into(),
                region: default_region(),
                path_style: true,
                access_key: None,
                secret_key: None,
                request_timeout: default_request_timeout(),
                read_after_write: true,
            },
            namespace: "test".into(),
            key_prefix: "benchblob".into(),
            object_size: ByteSize::mib(2),
            object_count: 1000,
            concurrency: 1,
            checkpoint_interval: 100,
            op_timeout: Duration::from_secs(60),
            verify: None,
            cleanup: false,
            hierarchy: Hierarchy::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `SB__`)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, if environment variables
    /// contain invalid values, or if the result fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no workload can run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.object_size.as_u64() > 0, "object_size must be positive");
        anyhow::ensure!(
            self.hierarchy.leaf_size.as_u64() > 0,
            "hierarchy.leaf_size must be positive"
        );
        anyhow::ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        anyhow::ensure!(
            self.checkpoint_interval >= 1,
            "checkpoint_interval must be at least 1"
        );
        anyhow::ensure!(!self.namespace.is_empty(), "namespace must not be empty");
        anyhow::ensure!(
            !self.hierarchy.root.is_empty(),
            "hierarchy.root must not be empty"
        );
        Ok(())
    }

    /// The configured verification mode, or the backend's default if none is set.
    pub fn verify_mode(&self) -> VerifyMode {
        self.verify.unwrap_or(match self.backend {
            Storage::Memory {} => VerifyMode::Content,
            Storage::S3Compatible { .. } => VerifyMode::Size,
        })
    }

    /// Settings for the workload driver.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            namespace: self.namespace.clone(),
            concurrency: self.concurrency,
            checkpoint_interval: self.checkpoint_interval,
            op_timeout: self.op_timeout,
            verify: self.verify_mode(),
        }
    }

    /// The throughput workload.
    pub fn workload(&self) -> WorkloadSpec {
        WorkloadSpec::new(
            self.key_prefix.as_str(),
            self.object_size.as_u64(),
            self.object_count,
        )
    }

    /// The hierarchy workload.
    pub fn hierarchy_spec(&self) -> HierarchySpec {
        HierarchySpec {
            root: self.hierarchy.root.clone(),
            top_groups: self.hierarchy.top_groups,
            sub_groups: self.hierarchy.sub_groups,
            leaves: self.hierarchy.leaves,
            leaf_size: self.hierarchy.leaf_size.as_u64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.namespace, "test");
            assert_eq!(config.object_size, ByteSize::mib(2));
            assert_eq!(config.object_count, 1000);
            assert_eq!(config.concurrency, 1);
            assert_eq!(config.verify, None);
            assert_eq!(config.verify_mode(), VerifyMode::Size);
            assert_eq!(config.driver_config().verify, VerifyMode::Size);
            assert_eq!(config.logging.level, LevelFilter::INFO);

            let s3 = config.backend.s3_config().unwrap();
            assert_eq!(s3.endpoint, "http://localhost:9000");
            assert!(s3.path_style);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SB__BACKEND__ENDPOINT", "http://localhost:8888");
            jail.set_env("SB__BACKEND__SECRET_KEY", "abcde");
            jail.set_env("SB__OBJECT_COUNT", "50");
            jail.set_env("SB__OP_TIMEOUT", "5s");
            jail.set_env("SB__VERIFY", "size");
            jail.set_env("SB__HIERARCHY__TOP_GROUPS", "2");
            jail.set_env("SB__LOGGING__LEVEL", "debug");

            let config = Config::load(None).unwrap();

            let Storage::S3Compatible {
                endpoint,
                secret_key,
                ..
            } = &dbg!(&config).backend
            else {
                panic!("expected s3 storage");
            };
            assert_eq!(endpoint, "http://localhost:8888");
            assert_eq!(
                secret_key.as_ref().unwrap().expose_secret().as_str(),
                "abcde"
            );
            assert_eq!(config.object_count, 50);
            assert_eq!(config.op_timeout, Duration::from_secs(5));
            assert_eq!(config.verify, Some(VerifyMode::Size));
            assert_eq!(config.hierarchy.top_groups, 2);
            assert_eq!(config.hierarchy.sub_groups, 10);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            namespace: bench
            key_prefix: blobs
            object_size: 1 KiB
            object_count: 10
            backend:
                type: memory
            hierarchy:
                top_groups: 2
                sub_groups: 2
                leaves: 3
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert!(matches!(config.backend, Storage::Memory {}));
            assert!(config.backend.s3_config().is_none());

            let workload = config.workload();
            assert_eq!(workload.pattern.key(3), "blobs/00003.bin");
            assert_eq!(workload.object_size, 1024);
            assert_eq!(workload.object_count, 10);

            let hierarchy = config.hierarchy_spec();
            assert_eq!(hierarchy.expected_leaves(), 12);
            assert_eq!(hierarchy.root, "hierarchy");

            let driver = config.driver_config();
            assert_eq!(driver.namespace, "bench");
            assert_eq!(driver.verify, VerifyMode::Content);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            object_count: 10
            backend:
                type: s3compatible
                endpoint: http://localhost:8888
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("SB__BACKEND__ENDPOINT", "http://localhost:9001");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // env overrides the yaml file
            let s3 = config.backend.s3_config().unwrap();
            assert_eq!(s3.endpoint, "http://localhost:9001");
            assert_eq!(config.object_count, 10);

            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SB__CONCURRENCY", "0");
            assert!(Config::load(None).is_err());

            jail.set_env("SB__CONCURRENCY", "1");
            jail.set_env("SB__OBJECT_SIZE", "0");
            assert!(Config::load(None).is_err());

            Ok(())
        });
    }

    #[test]
    fn rejects_empty_hierarchy_root() {
        let config = Config {
            hierarchy: Hierarchy {
                root: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "hierarchy.root must not be empty");
    }

    #[test]
    fn explicit_verify_mode_wins() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SB__VERIFY", "content");
            let config = Config::load(None).unwrap();
            assert_eq!(config.driver_config().verify, VerifyMode::Content);

            jail.set_env("SB__BACKEND__TYPE", "memory");
            jail.set_env("SB__VERIFY", "size");
            let config = Config::load(None).unwrap();
            assert_eq!(config.driver_config().verify, VerifyMode::Size);

            Ok(())
        });
    }

    #[test]
    fn secret_key_is_redacted() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SB__BACKEND__SECRET_KEY", "supersecret");

            let config = Config::load(None).unwrap();
            assert!(!format!("{config:?}").contains("supersecret"));

            Ok(())
        });
    }
}
