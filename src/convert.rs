use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::{Error, Result};

/// Turns one Markdown source into raw man page text.
pub trait Converter {
    fn convert(&self, source: &Path) -> Result<Vec<u8>>;

    /// Shell-ish rendering of the command, for dry runs and logs.
    fn describe(&self, source: &Path) -> String;
}

/// Runs `pandoc -s -t man <source>` and captures stdout.
#[derive(Debug, Clone)]
pub struct Pandoc {
    program: OsString,
}

pub const DEFAULT_PROGRAM: &str = "pandoc";
const ARGS: [&str; 3] = ["-s", "-t", "man"];

impl Pandoc {
    pub fn new<S: Into<OsString>>(program: S) -> Pandoc {
        Pandoc {
            program: program.into(),
        }
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Default for Pandoc {
    fn default() -> Pandoc {
        Pandoc::new(DEFAULT_PROGRAM)
    }
}

impl Converter for Pandoc {
    fn convert(&self, source: &Path) -> Result<Vec<u8>> {
        debug!("running {}", self.describe(source));
        // stderr is inherited so pandoc's own diagnostics reach the operator
        let output = Command::new(&self.program)
            .args(&ARGS)
            .arg(source)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| Error::ConverterSpawn {
                program: self.program_name(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(Error::ConverterFailed {
                program: self.program_name(),
                source_path: source.to_path_buf(),
                status: output.status,
            });
        }
        Ok(output.stdout)
    }

    fn describe(&self, source: &Path) -> String {
        format!(
            "{} {} {}",
            self.program_name(),
            ARGS.join(" "),
            source.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn describe_renders_the_command_line() {
        let p = Pandoc::default();
        assert_eq!(
            p.describe(Path::new("docs/mdman.1.md")),
            "pandoc -s -t man docs/mdman.1.md"
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let p = Pandoc::new("mdman-no-such-converter-on-path");
        match p.convert(Path::new("x.md")) {
            Err(Error::ConverterSpawn { program, .. }) => {
                assert_eq!(program, "mdman-no-such-converter-on-path")
            }
            other => panic!("expected spawn error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_converter_failure() {
        let p = Pandoc::new("false");
        match p.convert(Path::new("x.md")) {
            Err(Error::ConverterFailed { status, .. }) => assert!(!status.success()),
            other => panic!("expected converter failure, got {:?}", other),
        }
    }
}
