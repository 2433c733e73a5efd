use std::env;
use std::path::PathBuf;
use std::process;

use docopt::Docopt;
use human_panic::setup_panic;
use log::{debug, LevelFilter};
use serde_derive::Deserialize;

use mdman::{Config, Goal, Options, Pandoc, Project, Report};

const USAGE: &str = "
Build man pages from Markdown sources.

Every <name>.md in the directory becomes the man page <name>, converted
with pandoc.

Usage:
  mdman [options] [<goal>...]
  mdman (-h | --help)
  mdman --version

Goals are run in order. `all` (the default) builds every page that is
out of date, `clean` removes every generated page, and any other goal
names a single page to build, such as mdman.1.

Options:
  -C <dir>, --directory <dir>  Work in <dir>. [default: .]
  -B, --always-make            Rebuild pages that are up to date.
  -k, --keep-going             Keep building after a page fails.
  -n, --dry-run                Show what would be done, change nothing.
  --converter <prog>           Converter to run instead of pandoc.
                               Also read from MDMAN_CONVERTER.
  -v, --verbose                Log each step.
  -h, --help                   Show this screen.
  --version                    Show version.
";

const CONVERTER_ENV: &str = "MDMAN_CONVERTER";

#[derive(Debug, Deserialize)]
struct Args {
    arg_goal: Vec<String>,
    flag_directory: String,
    flag_always_make: bool,
    flag_keep_going: bool,
    flag_dry_run: bool,
    flag_converter: Option<String>,
    flag_verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let program = self
            .flag_converter
            .clone()
            .or_else(|| env::var(CONVERTER_ENV).ok())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| mdman::convert::DEFAULT_PROGRAM.to_string());
        Config {
            dir: PathBuf::from(&self.flag_directory),
            converter: Pandoc::new(program),
            options: Options {
                always_make: self.flag_always_make,
                keep_going: self.flag_keep_going,
                dry_run: self.flag_dry_run,
            },
        }
    }

    fn goals(&self) -> Vec<Goal> {
        self.arg_goal.iter().map(|g| Goal::parse(g)).collect()
    }
}

fn main() {
    setup_panic!();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.version(Some(env!("CARGO_PKG_VERSION").to_string())).deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logging(args.flag_verbose);
    debug!("{:?}", args);

    if let Err(e) = run(&args) {
        eprintln!("mdman: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or("warn");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose && env::var_os("RUST_LOG").is_none() {
        builder.filter_module("mdman", LevelFilter::Info);
    }
    builder.init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.config();
    let dry_run = config.options.dry_run;
    let report = Project::new(config).run(&args.goals())?;
    print_report(&report, dry_run);
    Ok(())
}

fn print_report(report: &Report, dry_run: bool) {
    let (build_verb, remove_verb) = if dry_run {
        ("would build", "would remove")
    } else {
        ("built", "removed")
    };
    for path in &report.removed {
        println!("{} {}", remove_verb, path.display());
    }
    for path in &report.built {
        println!("{} {}", build_verb, path.display());
    }
    for path in &report.up_to_date {
        println!("{} is up to date", path.display());
    }
}
