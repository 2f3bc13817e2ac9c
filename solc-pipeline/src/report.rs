//! Subscribe to events in the compiler pipeline

use crate::{
    artifacts::{CompilerInput, CompilerOutput},
    releases::CompilerRelease,
};
use once_cell::sync::OnceCell;
use std::{error::Error, fmt, path::Path, sync::Arc};
use yansi::Paint;

static GLOBAL_REPORTER: OnceCell<Report> = OnceCell::new();

/// Install this `Reporter` as the global default if one is
/// not already set.
///
/// # Errors
/// Returns an Error if the initialization was unsuccessful, likely
/// because a global reporter was already installed by another
/// call to `try_init`.
pub fn try_init<T>(reporter: T) -> Result<(), Box<dyn Error + Send + Sync + 'static>>
where
    T: Reporter + Send + Sync + 'static,
{
    GLOBAL_REPORTER.set(Report::new(reporter)).map_err(|_| SetGlobalReporterError { _priv: () })?;
    Ok(())
}

/// Install this `Reporter` as the global default.
///
/// # Panics
///
/// Panics if the initialization was unsuccessful, likely because a
/// global reporter was already installed by another call to `try_init`.
/// ```rust
/// use solc_pipeline::report::BasicStdoutReporter;
/// solc_pipeline::report::init(BasicStdoutReporter::default());
/// ```
pub fn init<T>(reporter: T)
where
    T: Reporter + Send + Sync + 'static,
{
    try_init(reporter).expect("Failed to install global reporter")
}

/// Trait representing the functions required to emit information about various steps in the
/// compiler pipeline.
///
/// This trait provides a series of callbacks that are invoked at certain parts of the
/// [`crate::Project::compile()`] process.
///
/// A `Reporter` is entirely passive and only listens to incoming "events".
pub trait Reporter: 'static {
    /// Callback invoked right before the compiler is invoked
    fn on_compiler_spawn(&self, _version: &str, _input: &CompilerInput) {}

    /// Invoked with the `CompilerOutput` if the compiler returned without fatal diagnostics
    fn on_compiler_success(&self, _version: &str, _output: &CompilerOutput) {}

    /// Invoked before a compiler build is downloaded
    fn on_compiler_installation_start(&self, _release: &CompilerRelease) {}

    /// Invoked after a compiler build was downloaded, verified and cached
    fn on_compiler_installation_success(&self, _release: &CompilerRelease) {}

    /// Invoked if downloading or verifying a compiler build failed
    fn on_compiler_installation_error(&self, _release: &CompilerRelease, _error: &str) {}

    /// Invoked if the existing artifacts are up to date
    fn on_unchanged(&self, _artifacts: &Path) {}

    /// Invoked for every compiled contract that is dropped because another contract with the same
    /// name is kept
    fn on_duplicate_contract(&self, _name: &str, _kept: &str, _discarded: &str) {}
}

pub(crate) fn compiler_spawn(version: &str, input: &CompilerInput) {
    with_global(|r| r.reporter.on_compiler_spawn(version, input));
}

pub(crate) fn compiler_success(version: &str, output: &CompilerOutput) {
    with_global(|r| r.reporter.on_compiler_success(version, output));
}

pub(crate) fn compiler_installation_start(release: &CompilerRelease) {
    with_global(|r| r.reporter.on_compiler_installation_start(release));
}

pub(crate) fn compiler_installation_success(release: &CompilerRelease) {
    with_global(|r| r.reporter.on_compiler_installation_success(release));
}

pub(crate) fn compiler_installation_error(release: &CompilerRelease, error: &str) {
    with_global(|r| r.reporter.on_compiler_installation_error(release, error));
}

pub(crate) fn unchanged(artifacts: &Path) {
    with_global(|r| r.reporter.on_unchanged(artifacts));
}

pub(crate) fn duplicate_contract(name: &str, kept: &str, discarded: &str) {
    with_global(|r| r.reporter.on_duplicate_contract(name, kept, discarded));
}

/// Executes a closure with a reference to the `Reporter`.
pub fn with_global<T>(f: impl FnOnce(&Report) -> T) -> Option<T> {
    GLOBAL_REPORTER.get().map(f)
}

/// A no-op [`Reporter`] that does nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoReporter(());

impl Reporter for NoReporter {}

/// A [`Reporter`] that emits some general information to `stdout`
#[derive(Copy, Clone, Debug, Default)]
pub struct BasicStdoutReporter(());

impl Reporter for BasicStdoutReporter {
    fn on_compiler_spawn(&self, version: &str, input: &CompilerInput) {
        println!("Compiling {} files with {}", input.sources.len(), version);
    }

    fn on_compiler_success(&self, _: &str, output: &CompilerOutput) {
        let warnings = output.warnings().count();
        if warnings > 0 {
            println!(
                "{} with {} {}",
                Paint::green("Compilation finished successfully"),
                warnings,
                Paint::yellow("warnings")
            );
        } else {
            println!("{}", Paint::green("Compilation finished successfully"));
        }
    }

    fn on_compiler_installation_start(&self, release: &CompilerRelease) {
        println!("installing solc version \"{}\"", release.long_version);
    }

    fn on_compiler_installation_success(&self, release: &CompilerRelease) {
        println!("Successfully installed solc {}", release.long_version);
    }

    fn on_compiler_installation_error(&self, release: &CompilerRelease, error: &str) {
        println!("{} solc {}: {}", Paint::red("Failed to install"), release.long_version, error);
    }

    fn on_unchanged(&self, artifacts: &Path) {
        println!("No files changed, artifacts in \"{}\" are up to date", artifacts.display());
    }

    fn on_duplicate_contract(&self, name: &str, kept: &str, discarded: &str) {
        println!(
            "{}: contract {} from \"{}\" is shadowed by \"{}\"",
            Paint::yellow("Warning"),
            name,
            discarded,
            kept
        );
    }
}

/// Returned if setting the global reporter fails.
#[derive(Debug)]
pub struct SetGlobalReporterError {
    // private marker so this type can't be initiated
    _priv: (),
}

impl fmt::Display for SetGlobalReporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("a global reporter has already been set")
    }
}

impl Error for SetGlobalReporterError {}

/// `Report` trace data to a [`Reporter`].
pub struct Report {
    reporter: Arc<dyn Reporter + Send + Sync>,
}

impl Report {
    /// Returns a new `Report` that does nothing
    pub fn none() -> Self {
        Report { reporter: Arc::new(NoReporter::default()) }
    }

    /// Returns a `Report` that forwards to the given [`Reporter`].
    pub fn new<S>(reporter: S) -> Self
    where
        S: Reporter + Send + Sync + 'static,
    {
        Self { reporter: Arc::new(reporter) }
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report").finish_non_exhaustive()
    }
}
