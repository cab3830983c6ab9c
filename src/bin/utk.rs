//! `utk`: the command-line front end over the `fw` library. Runs a
//! chain of commands left-to-right against one in-memory tree, so e.g.
//! `utk a.rom find foo table json` finds, then prints a table, then
//! prints JSON, all against the same parsed image.

use clap::Parser;
use fw::cli::{parse_invocations, Cli, Invocation};
use fw::tree::FlashImage;
use fw::visitor::Visitor;
use fw::visitors::{extract, find, json, parse_dir, remove, replace_pe32, save, table};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("utk: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> fw::Result<()> {
    let invocations = parse_invocations(&cli.rest)?;

    // `parse_dir` is the one command that does not need a parsed image
    // at all -- `cli.image` names the directory to reassemble from, not
    // a firmware image to read. Since it never touches a tree, it only
    // makes sense as the image positional argument's whole pipeline;
    // reject mixing it with other commands rather than guessing intent.
    if let [Invocation::ParseDir { dir }] = invocations.as_slice() {
        let bytes = parse_dir::parse_dir(dir)?;
        let out = cli.image;
        std::fs::write(out, bytes)?;
        return Ok(());
    }
    if invocations.iter().any(|i| matches!(i, Invocation::ParseDir { .. })) {
        return Err(fw::Error::Summary("parse_dir must be the only command in the pipeline".into()));
    }

    let bytes = std::fs::read(&cli.image)?;
    let mut image = FlashImage::parse(&bytes)?;

    let findings: Vec<_> = image.root().iter().flat_map(fw::tree::Node::validate).collect();
    if !findings.is_empty() {
        for finding in &findings {
            eprintln!("utk: validation finding: {finding}");
        }
        return Err(fw::Error::Summary(format!(
            "{} validation finding(s), refusing to run any command",
            findings.len()
        )));
    }

    for invocation in invocations {
        run_one(&mut image, invocation)?;
    }
    Ok(())
}

fn run_one(image: &mut FlashImage, invocation: Invocation) -> fw::Result<()> {
    match invocation {
        Invocation::Table => {
            let mut visitor = table::TableVisitor::default();
            for root in image.root() {
                visitor.walk(&root, "")?;
            }
            print!("{}", visitor.render());
        }
        Invocation::Json { flat } => {
            if flat {
                let mut visitor = json::JsonVisitor::default();
                for root in image.root() {
                    visitor.walk(&root, "")?;
                }
                println!("{}", serde_json::to_string_pretty(&visitor.nodes).map_err(|e| fw::Error::Summary(e.to_string()))?);
            } else {
                let summaries: Vec<_> = image.root().iter().map(|n| json::summarize(n, n.kind_name())).collect();
                println!("{}", serde_json::to_string_pretty(&summaries).map_err(|e| fw::Error::Summary(e.to_string()))?);
            }
        }
        Invocation::Find { pattern } => {
            let regex = regex::Regex::new(&pattern).map_err(|e| fw::Error::Summary(e.to_string()))?;
            let mut visitor = find::FindVisitor::new(regex);
            for root in image.root() {
                visitor.walk(&root, "")?;
            }
            for path in &visitor.found {
                println!("{path}");
            }
        }
        Invocation::Remove { pattern } => {
            let regex = regex::Regex::new(&pattern).map_err(|e| fw::Error::Summary(e.to_string()))?;
            let removed = remove::remove_matching(image, &regex);
            log::info!("removed {removed} node(s) matching {pattern:?}");
        }
        Invocation::ReplacePe32 { pattern, replacement } => {
            let regex = regex::Regex::new(&pattern).map_err(|e| fw::Error::Summary(e.to_string()))?;
            let new_bytes = std::fs::read(replacement)?;
            let replaced = replace_pe32::replace_pe32(image, &regex, &new_bytes)?;
            log::info!("replaced {replaced} PE32 section(s) matching {pattern:?}");
        }
        Invocation::Extract { dir } => {
            extract::extract(image, &dir)?;
        }
        Invocation::Save { file } => {
            save::save(image, &file)?;
        }
        Invocation::ParseDir { .. } => {
            unreachable!("rejected in run() before any command executes")
        }
    }
    Ok(())
}
