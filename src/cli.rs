//! The `utk` argument grammar: `utk <image-or-dir> [<command> [args…]]*`.
//!
//! Clap's derive `Subcommand` only knows how to parse a single
//! subcommand per invocation, but `utk` runs an arbitrary number of
//! commands left-to-right against the same in-memory tree (`utk a.rom
//! find foo table json`). We let clap own the top-level flags (image
//! path, `--help`/`--version`) and collect everything after the image
//! path as raw trailing tokens, then walk those ourselves into a
//! `Vec<Invocation>` -- a small hand-rolled version of what clap's
//! subcommand matcher does for a single command.

use crate::error::{Error, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "utk", version, about = "Parse, edit, and reassemble UEFI/Intel firmware images")]
pub struct Cli {
    /// The firmware image to operate on, or (for `parse_dir`-only
    /// pipelines) a directory `extract` previously produced.
    pub image: PathBuf,

    /// `command [args…]` tuples, repeated; parsed by [`parse_invocations`].
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

/// One parsed command in the pipeline, in the order it should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `parse` is the legacy alias for `json` (non-flat).
    Json { flat: bool },
    Table,
    Find { pattern: String },
    Remove { pattern: String },
    ReplacePe32 { pattern: String, replacement: PathBuf },
    Extract { dir: PathBuf },
    Save { file: PathBuf },
    ParseDir { dir: PathBuf },
}

/// Walks `rest` into the ordered list of commands to run. Unlike clap's
/// own subcommand dispatch, this accepts any number of commands back to
/// back, since each one only consumes the tokens its own arity needs.
pub fn parse_invocations(rest: &[String]) -> Result<Vec<Invocation>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < rest.len() {
        let name = rest[i].as_str();
        i += 1;
        let invocation = match name {
            "parse" => Invocation::Json { flat: false },
            "json" => {
                let flat = rest.get(i).map(|s| s == "--flat").unwrap_or(false);
                if flat {
                    i += 1;
                }
                Invocation::Json { flat }
            }
            "table" => Invocation::Table,
            "find" => {
                let pattern = take_arg(rest, &mut i, "find", "REGEX")?;
                Invocation::Find { pattern }
            }
            "remove" => {
                let pattern = take_arg(rest, &mut i, "remove", "REGEX")?;
                Invocation::Remove { pattern }
            }
            "replace_pe32" => {
                let pattern = take_arg(rest, &mut i, "replace_pe32", "REGEX")?;
                let replacement = take_arg(rest, &mut i, "replace_pe32", "FILE")?;
                Invocation::ReplacePe32 { pattern, replacement: replacement.into() }
            }
            "extract" => {
                let dir = take_arg(rest, &mut i, "extract", "DIR")?;
                Invocation::Extract { dir: dir.into() }
            }
            "save" => {
                let file = take_arg(rest, &mut i, "save", "FILE")?;
                Invocation::Save { file: file.into() }
            }
            "parse_dir" => {
                let dir = take_arg(rest, &mut i, "parse_dir", "DIR")?;
                Invocation::ParseDir { dir: dir.into() }
            }
            other => return Err(Error::Summary(format!("unrecognized command {other:?}"))),
        };
        out.push(invocation);
    }
    Ok(out)
}

fn take_arg(rest: &[String], i: &mut usize, command: &str, what: &str) -> Result<String> {
    let arg = rest.get(*i).ok_or_else(|| Error::Summary(format!("command {command:?} requires a {what} argument")))?;
    *i += 1;
    Ok(arg.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chained_pipeline() {
        let rest: Vec<String> =
            ["find", "foo", "table", "json", "--flat"].iter().map(|s| s.to_string()).collect();
        let invocations = parse_invocations(&rest).unwrap();
        assert_eq!(
            invocations,
            vec![
                Invocation::Find { pattern: "foo".into() },
                Invocation::Table,
                Invocation::Json { flat: true },
            ]
        );
    }

    #[test]
    fn parse_is_the_json_alias() {
        let rest: Vec<String> = ["parse".to_string()];
        assert_eq!(parse_invocations(&rest).unwrap(), vec![Invocation::Json { flat: false }]);
    }

    #[test]
    fn missing_argument_is_an_error() {
        let rest: Vec<String> = ["find".to_string()];
        assert!(parse_invocations(&rest).is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        let rest: Vec<String> = ["bogus".to_string()];
        assert!(parse_invocations(&rest).is_err());
    }
}
