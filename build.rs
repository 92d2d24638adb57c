//! Renders manual pages into `OUT_DIR`: `imagewright.1` for the binary and
//! `imagewright-<subcommand>.1` for every visible subcommand.

use std::error::Error;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const INPUTS: &[&str] = &["build.rs", "src/cli/mod.rs"];

fn main() -> Result<(), Box<dyn Error>> {
    rerun_when_changed(INPUTS)?;
    let out_dir = out_dir()?;
    for (title, command) in pages(&cli::Cli::command()) {
        write_page(&out_dir, &title, command)?;
    }
    Ok(())
}

fn rerun_when_changed(paths: &[&str]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for path in paths {
        writeln!(stdout, "cargo:rerun-if-changed={path}")?;
    }
    Ok(())
}

fn out_dir() -> io::Result<PathBuf> {
    std::env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "cargo did not set OUT_DIR"))
}

/// Page titles paired with the command each page documents. Subcommand
/// pages carry the full invocation in their usage line.
fn pages(root: &Command) -> Vec<(String, Command)> {
    let binary = root.get_name().to_owned();
    let subcommands = root
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set())
        .map(|sub| {
            let title = format!("{binary}-{}", sub.get_name());
            let invocation = format!("{binary} {}", sub.get_name());
            (title, sub.clone().bin_name(invocation))
        });
    std::iter::once((binary.clone(), root.clone()))
        .chain(subcommands)
        .collect()
}

fn write_page(out_dir: &Path, title: &str, command: Command) -> io::Result<()> {
    let mut file = File::create(out_dir.join(format!("{title}.1")))?;
    Man::new(command).title(title).render(&mut file)
}
