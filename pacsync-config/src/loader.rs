use crate::error::{ConfigError, Result};
use pacsync_model::AeTitle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Transport provider selection for the outbound session and the listener.
///
/// The standard upper-layer protocol binding is a deployment plug-in at the
/// session seam; the in-tree `loopback` provider answers queries and routes
/// retrievals from a fixture manifest, which is what the integration tests
/// and configuration drills run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Loopback {
        /// Fixture manifest describing the simulated remote archive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixture: Option<PathBuf>,
    },
}

/// The two endpoints of a reconciliation pass, as loaded from YAML.
///
/// Key names are camelCase on disk; `remoteName`/`localName` are AE titles
/// and are validated as such before anything connects or listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PacsEndpoints {
    pub hostname: String,
    pub remote_port: u16,
    pub remote_name: String,
    pub local_port: u16,
    pub local_name: String,
    #[serde(default)]
    pub use_tls: bool,
    /// Directory the listener persists into and the scanner reads back.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
}

impl PacsEndpoints {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let endpoints: PacsEndpoints = serde_yaml::from_str(&raw)?;
        endpoints.validate()?;
        Ok(endpoints)
    }

    /// Serialize back to YAML and write, the counterpart of [`Self::load`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        let raw = serde_yaml::to_string(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("hostname is empty".into()));
        }
        if self.remote_port == 0 {
            return Err(ConfigError::Invalid("remotePort must be non-zero".into()));
        }
        if self.local_port == 0 {
            return Err(ConfigError::Invalid("localPort must be non-zero".into()));
        }
        self.remote_ae()?;
        self.local_ae()?;
        Ok(())
    }

    /// The remote archive's AE title, validated.
    pub fn remote_ae(&self) -> Result<AeTitle> {
        AeTitle::new(&self.remote_name)
            .map_err(|e| ConfigError::Invalid(format!("remoteName: {e}")))
    }

    /// This system's own AE title (listener identity and move destination),
    /// validated.
    pub fn local_ae(&self) -> Result<AeTitle> {
        AeTitle::new(&self.local_name)
            .map_err(|e| ConfigError::Invalid(format!("localName: {e}")))
    }

    /// Commented starter file written by `pacsync-server init-config`.
    pub fn template() -> &'static str {
        "\
# pacsync endpoint configuration.
#
# remoteName / localName are DICOM application entity titles; the listener
# rejects associations whose called or calling AE does not match exactly.
hostname: pacs.example.org
remotePort: 104
remoteName: ARCHIVE
localPort: 11112
localName: PACSYNC
useTls: false
# Directory scanned for held objects and written to by the listener.
storageDir: .
# Transport provider. The in-tree loopback provider simulates the remote
# archive from a fixture manifest; use it to drill a configuration without
# touching production. The upper-layer protocol binding plugs in here.
# transport:
#   kind: loopback
#   fixture: drills/archive.yaml
"
    }
}
