use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::result;

use log::{debug, info, warn};

pub mod convert;
pub mod fixup;
pub mod page;

pub use crate::convert::{Converter, Pandoc};
pub use crate::fixup::fix_quotes;
pub use crate::page::{discover, target_path, Page};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot run converter `{program}`: {source}")]
    ConverterSpawn { program: String, source: io::Error },

    #[error("converter `{program}` failed on {}: {status}", .source_path.display())]
    ConverterFailed {
        program: String,
        source_path: PathBuf,
        status: ExitStatus,
    },

    #[error("converter produced no output for {}", .0.display())]
    ConverterNoOutput(PathBuf),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("no rule to make target `{0}`")]
    NoRule(String),

    #[error("{} page(s) failed: {}", .0.len(), join_errors(.0))]
    Failed(Vec<Error>),
}

impl Error {
    pub(crate) fn io<P: AsRef<Path>>(path: P, source: io::Error) -> Error {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Flags with the same meaning as their `make` counterparts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// `-B`: rebuild pages even when they are up to date.
    pub always_make: bool,
    /// `-k`: keep building other pages after one fails.
    pub keep_going: bool,
    /// `-n`: report what would happen without doing it.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dir: PathBuf,
    pub converter: Pandoc,
    pub options: Options,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            dir: PathBuf::from("."),
            converter: Pandoc::default(),
            options: Options::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goal {
    All,
    Clean,
    Target(String),
}

impl Goal {
    pub fn parse(s: &str) -> Goal {
        match s {
            "all" => Goal::All,
            "clean" => Goal::Clean,
            other => Goal::Target(other.to_string()),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::All => f.write_str("all"),
            Goal::Clean => f.write_str("clean"),
            Goal::Target(name) => f.write_str(name),
        }
    }
}

/// What a run did, or with `dry_run`, what it would have done.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub built: Vec<PathBuf>,
    pub up_to_date: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl Report {
    fn merge(&mut self, other: Report) {
        self.built.extend(other.built);
        self.up_to_date.extend(other.up_to_date);
        self.removed.extend(other.removed);
    }
}

pub struct Project<C = Pandoc> {
    dir: PathBuf,
    converter: C,
    options: Options,
}

impl Project<Pandoc> {
    pub fn new(config: Config) -> Project<Pandoc> {
        Project::with_converter(config.dir, config.converter, config.options)
    }
}

impl<C: Converter> Project<C> {
    pub fn with_converter<P: Into<PathBuf>>(dir: P, converter: C, options: Options) -> Project<C> {
        Project {
            dir: dir.into(),
            converter,
            options,
        }
    }

    pub fn pages(&self) -> Result<Vec<Page>> {
        discover(&self.dir)
    }

    /// Runs goals in order, the way `make clean all` would.
    pub fn run(&self, goals: &[Goal]) -> Result<Report> {
        if goals.is_empty() {
            return self.build_all();
        }
        let mut report = Report::default();
        let mut failures = Vec::new();
        for goal in goals {
            debug!("goal `{}`", goal);
            let step = match goal {
                Goal::All => self.build_all(),
                Goal::Clean => self.clean(),
                Goal::Target(name) => self.build_target(name),
            };
            match step {
                Ok(step) => report.merge(step),
                Err(Error::Failed(errors)) if self.options.keep_going => failures.extend(errors),
                Err(e) if self.options.keep_going => {
                    warn!("{}", e);
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::Failed(failures))
        }
    }

    /// Builds every stale page. Stops at the first failure unless
    /// `keep_going` is set, in which case all failures come back together.
    pub fn build_all(&self) -> Result<Report> {
        let mut report = Report::default();
        let mut failures = Vec::new();
        for page in self.pages()? {
            match self.make(&page, &mut report) {
                Ok(()) => {}
                Err(e) if self.options.keep_going => {
                    warn!("{}", e);
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::Failed(failures))
        }
    }

    /// Builds the page whose target file name is `name`, e.g. `mdman.1`.
    pub fn build_target(&self, name: &str) -> Result<Report> {
        let page = self
            .pages()?
            .into_iter()
            .find(|p| p.target.file_name().map_or(false, |n| n == name))
            .ok_or_else(|| Error::NoRule(name.to_string()))?;
        let mut report = Report::default();
        self.make(&page, &mut report)?;
        Ok(report)
    }

    fn make(&self, page: &Page, report: &mut Report) -> Result<()> {
        if !self.options.always_make && !page.is_stale()? {
            debug!("{} is up to date", page.target.display());
            report.up_to_date.push(page.target.clone());
            return Ok(());
        }
        if self.options.dry_run {
            info!(
                "would run {} > {}",
                self.converter.describe(&page.source),
                page.target.display()
            );
        } else {
            self.build_page(page)?;
        }
        report.built.push(page.target.clone());
        Ok(())
    }

    /// Converts one source and writes its target. The target only changes
    /// once the converter has succeeded with some output and that output is
    /// fully on disk.
    pub fn build_page(&self, page: &Page) -> Result<()> {
        let raw = self.converter.convert(&page.source)?;
        if raw.is_empty() {
            return Err(Error::ConverterNoOutput(page.source.clone()));
        }
        let fixed = fix_quotes(&raw);
        write_atomic(&page.target, &fixed)?;
        info!("built {}", page.target.display());
        Ok(())
    }

    /// Removes the target of every current source. Targets that are already
    /// gone are skipped silently.
    pub fn clean(&self) -> Result<Report> {
        let mut report = Report::default();
        for page in self.pages()? {
            if self.options.dry_run {
                if page.target.exists() {
                    report.removed.push(page.target);
                }
                continue;
            }
            match fs::remove_file(&page.target) {
                Ok(()) => {
                    info!("removed {}", page.target.display());
                    report.removed.push(page.target);
                }
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&page.target, e)),
            }
        }
        Ok(report)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix(".mdman");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // umask applies at creation, same as a `>` redirect
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir).map_err(|e| Error::io(dir, e))?;

    // a rebuild keeps whatever mode the old page had
    match fs::metadata(path) {
        Ok(meta) => tmp
            .as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| Error::io(tmp.path(), e))?,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(path, e)),
    }

    tmp.write_all(contents).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
