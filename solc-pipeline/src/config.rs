use crate::{
    artifacts::{EvmVersion, Optimizer, Settings},
    error::{Result, SolcError},
    releases::{CompilerRelease, Platform, DEFAULT_BASE_URL},
    utils,
};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Env var that points to the native solc binary to probe
pub const SOLC_PATH_ENV: &str = "SOLC_PATH";

/// Env var that points to the javascript runtime used for emscripten builds
pub const NODE_ENV: &str = "SOLC_PIPELINE_NODE";

/// Name of the directory compiler builds and release lists are cached in
pub const CACHE_DIR_NAME: &str = ".solc-pipeline";

/// Where to find all files or where to write them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPathsConfig {
    /// Project root, the working directory imports and logical names are resolved against
    pub root: PathBuf,
    /// Where to store build artifacts
    pub artifacts: PathBuf,
    /// Where to find sources
    pub sources: PathBuf,
}

impl ProjectPathsConfig {
    pub fn builder() -> ProjectPathsConfigBuilder {
        ProjectPathsConfigBuilder::default()
    }

    /// Creates a new config with the default layout: `<root>/contracts` and `<root>/build`
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::builder().build_with_root(root)
    }

    /// Creates a new config for the current working directory
    pub fn current() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|err| SolcError::io(err, "."))?;
        Self::new(cwd)
    }
}

impl fmt::Display for ProjectPathsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root: {}", self.root.display())?;
        writeln!(f, "contracts: {}", self.sources.display())?;
        write!(f, "artifacts: {}", self.artifacts.display())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPathsConfigBuilder {
    root: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    sources: Option<PathBuf>,
}

impl ProjectPathsConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn artifacts(mut self, artifacts: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(artifacts.into());
        self
    }

    pub fn sources(mut self, sources: impl Into<PathBuf>) -> Self {
        self.sources = Some(sources.into());
        self
    }

    /// Relative `sources` and `artifacts` are interpreted relative to `root`
    pub fn build_with_root(self, root: impl AsRef<Path>) -> Result<ProjectPathsConfig> {
        let root = utils::canonicalize(root)?;
        Ok(ProjectPathsConfig {
            artifacts: root.join(self.artifacts.unwrap_or_else(|| "build".into())),
            sources: root.join(self.sources.unwrap_or_else(|| "contracts".into())),
            root,
        })
    }

    pub fn build(self) -> Result<ProjectPathsConfig> {
        let root = match self.root.clone() {
            Some(root) => root,
            None => std::env::current_dir().map_err(|err| SolcError::io(err, "."))?,
        };
        self.build_with_root(root)
    }
}

/// How solc invocation should be configured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolcConfig {
    /// Configured solc settings
    pub settings: Settings,
    /// Compiler version to use instead of the source pragmas
    pub version: Option<String>,
}

impl SolcConfig {
    pub fn builder() -> SolcConfigBuilder {
        SolcConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SolcConfigBuilder {
    settings: Option<Settings>,
    version: Option<String>,
    optimizer: Option<Optimizer>,
    evm_version: Option<EvmVersion>,
}

impl SolcConfigBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Pins the compiler version, `0.5.9`, or a range like `^0.5.0`
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn optimizer(mut self, enabled: bool, runs: u32) -> Self {
        self.optimizer = Some(Optimizer::new(enabled, runs));
        self
    }

    pub fn evm_version(mut self, evm_version: EvmVersion) -> Self {
        self.evm_version = Some(evm_version);
        self
    }

    pub fn build(self) -> SolcConfig {
        let SolcConfigBuilder { settings, version, optimizer, evm_version } = self;
        let mut settings = settings.unwrap_or_default();
        if let Some(optimizer) = optimizer {
            settings.optimizer = optimizer;
        }
        if evm_version.is_some() {
            settings.evm_version = evm_version;
        }
        SolcConfig { settings, version }
    }
}

/// Where compilers are found, fetched from and cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Root of the shared build and release list cache
    pub cache_dir: PathBuf,
    /// Where builds are published
    pub base_url: String,
    /// Which builds to use
    pub platform: Platform,
    /// How long a fetched release list stays valid
    pub manifest_ttl: Duration,
    /// Timeout of every request
    pub timeout: Duration,
    /// How often a failed request is retried
    pub retries: usize,
    /// Natively installed solc to use if its version matches, `None` disables the lookup
    pub native_solc: Option<PathBuf>,
    /// Javascript runtime that runs emscripten builds
    pub js_runtime: PathBuf,
}

impl CompilerConfig {
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder::default()
    }

    /// `<base_url>/<platform>`
    pub fn platform_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.platform)
    }

    /// `<base_url>/<platform>/list.json`
    pub fn manifest_url(&self) -> String {
        format!("{}/list.json", self.platform_url())
    }

    /// `<cache_dir>/<platform>`
    pub fn platform_cache_dir(&self) -> PathBuf {
        self.cache_dir.join(self.platform.as_str())
    }

    /// `<cache_dir>/<platform>/list.json`
    pub fn manifest_cache_path(&self) -> PathBuf {
        self.platform_cache_dir().join("list.json")
    }

    /// Where the build of the release is cached
    pub fn binary_path(&self, release: &CompilerRelease) -> PathBuf {
        self.cache_dir.join(release.platform.as_str()).join(&release.path)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Returns the default cache dir `~/.solc-pipeline`
pub fn default_cache_dir() -> PathBuf {
    home::home_dir().unwrap_or_else(std::env::temp_dir).join(CACHE_DIR_NAME)
}

#[derive(Debug, Clone, Default)]
pub struct CompilerConfigBuilder {
    cache_dir: Option<PathBuf>,
    base_url: Option<String>,
    platform: Option<Platform>,
    manifest_ttl: Option<Duration>,
    timeout: Option<Duration>,
    retries: Option<usize>,
    native_solc: Option<Option<PathBuf>>,
    js_runtime: Option<PathBuf>,
}

impl CompilerConfigBuilder {
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn manifest_ttl(mut self, ttl: Duration) -> Self {
        self.manifest_ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the native solc to probe, `None` never uses a native installation
    pub fn native_solc(mut self, solc: Option<impl Into<PathBuf>>) -> Self {
        self.native_solc = Some(solc.map(Into::into));
        self
    }

    pub fn js_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.js_runtime = Some(runtime.into());
        self
    }

    pub fn build(self) -> CompilerConfig {
        CompilerConfig {
            cache_dir: self.cache_dir.unwrap_or_else(default_cache_dir),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            platform: self.platform.unwrap_or_default(),
            manifest_ttl: self.manifest_ttl.unwrap_or(Duration::from_secs(60 * 60)),
            timeout: self.timeout.unwrap_or(Duration::from_secs(60)),
            retries: self.retries.unwrap_or(3),
            native_solc: self.native_solc.unwrap_or_else(|| {
                Some(std::env::var_os(SOLC_PATH_ENV).map(PathBuf::from).unwrap_or_else(|| "solc".into()))
            }),
            js_runtime: self
                .js_runtime
                .or_else(|| std::env::var_os(NODE_ENV).map(PathBuf::from))
                .unwrap_or_else(|| "node".into()),
        }
    }
}
