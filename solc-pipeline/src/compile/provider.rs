//! Locating, downloading and caching compiler builds

use crate::{
    compile::{CompilerHandle, ScriptedSolc, Solc},
    config::CompilerConfig,
    error::{Result, SolcError},
    releases::{self, CompilerRelease},
    report, utils,
};
use sha2::Digest;
use std::{path::Path, sync::Arc};

/// Returns a [CompilerHandle] for a resolved release.
///
/// A matching native installation is preferred, then a previously cached build. Otherwise the
/// build is downloaded, verified against the published checksum and cached.
#[derive(Debug, Clone, Default)]
pub struct CompilerProvider {
    pub config: CompilerConfig,
}

impl CompilerProvider {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(skip_all, name = "provider::obtain", fields(version = %release.long_version))]
    pub fn obtain(&self, release: &CompilerRelease) -> Result<Arc<dyn CompilerHandle>> {
        if release.platform.is_native() {
            if let Some(solc) = self.find_native(release) {
                tracing::debug!("using native {}", solc);
                return Ok(Arc::new(solc))
            }
        }

        let path = self.config.binary_path(release);
        if path.is_file() {
            tracing::trace!("using cached build \"{}\"", path.display());
        } else {
            self.install(release, &path)?;
        }
        Ok(self.handle(release, path))
    }

    fn handle(&self, release: &CompilerRelease, path: impl AsRef<Path>) -> Arc<dyn CompilerHandle> {
        let path = path.as_ref().to_path_buf();
        if release.platform.is_native() {
            Arc::new(Solc::new(path).with_long_version(&release.long_version))
        } else {
            Arc::new(ScriptedSolc::new(&self.config.js_runtime, path, &release.long_version))
        }
    }

    /// Returns the configured native solc if it reports the version of the release
    fn find_native(&self, release: &CompilerRelease) -> Option<Solc> {
        let solc = Solc::new(self.config.native_solc.as_ref()?);
        match solc.probe_version() {
            Ok(version) if version == release.long_version => Some(solc.with_long_version(version)),
            Ok(version) => {
                tracing::trace!("native {} is {}, not {}", solc, version, release.long_version);
                None
            }
            Err(err) => {
                tracing::trace!("no usable native {}: {}", solc, err);
                None
            }
        }
    }

    /// Downloads, verifies and caches the build at `path`
    fn install(&self, release: &CompilerRelease, path: &Path) -> Result<()> {
        tracing::trace!("installing {} to \"{}\"", release, path.display());
        report::compiler_installation_start(release);
        let result = self.download(release).and_then(|content| {
            verify_checksum(release, &content)?;
            if release.platform.is_native() {
                utils::write_atomic_executable(path, &content)
            } else {
                utils::write_atomic(path, &content)
            }
        });
        match result {
            Ok(()) => {
                report::compiler_installation_success(release);
                Ok(())
            }
            Err(err) => {
                report::compiler_installation_error(release, &err.to_string());
                Err(err)
            }
        }
    }

    fn download(&self, release: &CompilerRelease) -> Result<Vec<u8>> {
        tracing::debug!("downloading {}", release.url);
        let client = releases::http_client(&self.config)?;
        let content = utils::retry(self.config.retries, "downloading solc", || {
            client
                .get(&release.url)
                .send()
                .and_then(|resp| resp.error_for_status())
                .and_then(|resp| resp.bytes())
        })
        .map_err(|err| SolcError::download(&release.url, err))?;
        Ok(content.to_vec())
    }
}

/// Checks the sha256 of a downloaded build against the published value
pub fn verify_checksum(release: &CompilerRelease, content: &[u8]) -> Result<()> {
    let mut hasher = sha2::Sha256::new();
    hasher.update(content);
    let detected = hex::encode(hasher.finalize());
    let expected = release.sha256.trim_start_matches("0x").to_lowercase();
    if detected == expected {
        Ok(())
    } else {
        tracing::warn!(
            "checksum mismatch for {}, expected {}, but found {}",
            release.long_version,
            expected,
            detected
        );
        Err(SolcError::ChecksumMismatch {
            version: release.version.clone(),
            expected,
            detected,
            url: release.url.clone(),
        })
    }
}
