use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use quakerelay_pdl::ProductClientConfig;
use serde::Deserialize;

/// Server settings, deserialized from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_bind")]
    pub(crate) bind: String,
    /// JVM executable used to run the product client jar.
    pub(crate) java_path: String,
    /// Path to ProductClient.jar.
    pub(crate) product_client_jar: String,
    /// Value passed through as `--configFile=`.
    pub(crate) product_client_config: String,
    /// Value passed through as `--privateKey=`.
    pub(crate) private_key_path: String,
    /// QuakeML template used for origin cancellations.
    #[serde(default = "default_quakeml_template")]
    pub(crate) quakeml_template_path: PathBuf,
    /// Staging directory for summary.json, missing.html, and fetched
    /// attachments. Holds the builds/ subdirectory for QuakeML output.
    #[serde(default = "default_work_dir")]
    pub(crate) work_dir: PathBuf,
    /// Durable archive directory. Defaults to `<work_dir>/archive`.
    #[serde(default)]
    archive_dir: Option<PathBuf>,
    /// When set, flows log and report success without spawning the
    /// product client.
    #[serde(default)]
    pub(crate) skip_send: bool,
    /// Upper bound on a single product client run.
    #[serde(default = "default_transmit_timeout_ms")]
    pub(crate) transmit_timeout_ms: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8573".to_string()
}

fn default_quakeml_template() -> PathBuf {
    PathBuf::from("params/quakeml_cancel_template.xml")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_transmit_timeout_ms() -> u64 {
    120_000
}

impl ServerConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub(crate) fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("archive"))
    }

    /// Startup checks. The staging and archive directories are created when
    /// missing; the executable, jar, and template must already exist unless
    /// sending is disabled.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.skip_send {
            tracing::info!("sending disabled, skipping product client path checks");
        } else {
            if !Path::new(&self.java_path).is_file() {
                bail!("java_path '{}' is not an existing file", self.java_path);
            }
            if !Path::new(&self.product_client_jar).is_file() {
                bail!(
                    "product_client_jar '{}' is not an existing file",
                    self.product_client_jar
                );
            }
            if !self.quakeml_template_path.is_file() {
                bail!(
                    "quakeml_template_path '{}' is not an existing file",
                    self.quakeml_template_path.display()
                );
            }
        }
        std::fs::create_dir_all(&self.work_dir).with_context(|| {
            format!("work_dir {} is not writable", self.work_dir.display())
        })?;
        std::fs::create_dir_all(self.archive_dir()).with_context(|| {
            format!(
                "archive_dir {} is not writable",
                self.archive_dir().display()
            )
        })?;
        Ok(())
    }

    pub(crate) fn product_client(&self) -> ProductClientConfig {
        ProductClientConfig {
            java_path: self.java_path.clone(),
            jar_path: self.product_client_jar.clone(),
            config_file: self.product_client_config.clone(),
            private_key_path: self.private_key_path.clone(),
            quakeml_template: self.quakeml_template_path.clone(),
            builds_dir: self.work_dir.join("builds"),
            skip_send: self.skip_send,
            timeout_ms: self.transmit_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_CONFIG: &str = r#"
java_path = "/usr/bin/java"
product_client_jar = "/opt/pdl/ProductClient.jar"
product_client_config = "/opt/pdl/config.ini"
private_key_path = "/opt/pdl/id_rsa"
"#;

    #[test]
    fn unit_minimal_config_applies_defaults() {
        let config: ServerConfig = toml::from_str(MINIMAL_CONFIG).expect("parse");
        assert_eq!(config.bind, "0.0.0.0:8573");
        assert_eq!(
            config.quakeml_template_path,
            PathBuf::from("params/quakeml_cancel_template.xml")
        );
        assert_eq!(config.work_dir, PathBuf::from("."));
        assert_eq!(config.archive_dir(), PathBuf::from("./archive"));
        assert!(!config.skip_send);
        assert_eq!(config.transmit_timeout_ms, 120_000);
    }

    #[test]
    fn unit_explicit_values_override_defaults() {
        let raw = format!(
            "{MINIMAL_CONFIG}\nbind = \"127.0.0.1:9100\"\nwork_dir = \"/var/lib/quakerelay\"\n\
             archive_dir = \"/srv/archive\"\nskip_send = true\ntransmit_timeout_ms = 5000\n"
        );
        let config: ServerConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(config.bind, "127.0.0.1:9100");
        assert_eq!(config.work_dir, PathBuf::from("/var/lib/quakerelay"));
        assert_eq!(config.archive_dir(), PathBuf::from("/srv/archive"));
        assert!(config.skip_send);
        assert_eq!(config.transmit_timeout_ms, 5000);
    }

    #[test]
    fn unit_archive_dir_defaults_under_work_dir() {
        let raw = format!("{MINIMAL_CONFIG}\nwork_dir = \"/tmp/quakerelay\"\n");
        let config: ServerConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(config.archive_dir(), PathBuf::from("/tmp/quakerelay/archive"));
    }

    #[test]
    fn unit_product_client_mapping_carries_builds_dir() {
        let raw = format!("{MINIMAL_CONFIG}\nwork_dir = \"/tmp/quakerelay\"\n");
        let config: ServerConfig = toml::from_str(&raw).expect("parse");
        let tool = config.product_client();
        assert_eq!(tool.java_path, "/usr/bin/java");
        assert_eq!(tool.jar_path, "/opt/pdl/ProductClient.jar");
        assert_eq!(tool.config_file, "/opt/pdl/config.ini");
        assert_eq!(tool.private_key_path, "/opt/pdl/id_rsa");
        assert_eq!(tool.builds_dir, PathBuf::from("/tmp/quakerelay/builds"));
        assert_eq!(tool.timeout_ms, 120_000);
    }

    #[test]
    fn functional_load_reads_file_and_reports_missing_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("quakerelay.toml");
        std::fs::write(&path, MINIMAL_CONFIG).expect("write config");
        let config = ServerConfig::load(&path).expect("load");
        assert_eq!(config.java_path, "/usr/bin/java");

        let missing = temp.path().join("absent.toml");
        let error = ServerConfig::load(&missing).expect_err("missing file");
        assert!(error.to_string().contains("absent.toml"));
    }

    #[test]
    fn functional_validate_creates_staging_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work_dir = temp.path().join("work");
        let raw = format!(
            "{MINIMAL_CONFIG}\nwork_dir = \"{}\"\nskip_send = true\n",
            work_dir.display()
        );
        let config: ServerConfig = toml::from_str(&raw).expect("parse");
        config.validate().expect("validate");
        assert!(work_dir.is_dir());
        assert!(work_dir.join("archive").is_dir());
    }

    #[test]
    fn functional_validate_rejects_missing_java_when_sending_enabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let raw = format!(
            "java_path = \"{java}\"\nproduct_client_jar = \"{jar}\"\n\
             product_client_config = \"/opt/pdl/config.ini\"\n\
             private_key_path = \"/opt/pdl/id_rsa\"\nwork_dir = \"{work}\"\n",
            java = temp.path().join("no-java").display(),
            jar = temp.path().join("no-jar").display(),
            work = temp.path().display()
        );
        let config: ServerConfig = toml::from_str(&raw).expect("parse");
        let error = config.validate().expect_err("missing java");
        assert!(error.to_string().contains("java_path"));
    }
}
