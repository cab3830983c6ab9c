//! `glzma`: a small standalone front end over [`fw::codec`], useful for
//! exercising the LZMA/LZMAX86 GUID-defined section codec outside of a
//! full firmware image.
//!
//! Grammar: `glzma (-d|-e) [-f86] -o OUTPUT INPUT`. `-f86` is a single
//! combined flag token (not `-f 86`), which is why this is parsed by
//! hand rather than through `clap`'s derive macros -- the same reason
//! `cli.rs` hand-walks `utk`'s trailing command tokens instead of
//! leaning on `clap::Subcommand` for them.
use fw::codec::{Codec, LzmaCodec, LzmaX86Codec};
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    decode: bool,
    f86: bool,
    output: PathBuf,
    input: PathBuf,
}

fn parse_args(mut args: std::vec::IntoIter<String>) -> fw::Result<Args> {
    let usage = "usage: glzma (-d|-e) [-f86] -o OUTPUT INPUT";
    let mut mode: Option<bool> = None;
    let mut f86 = false;
    let mut output: Option<PathBuf> = None;
    let mut input: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" => mode = Some(true),
            "-e" => mode = Some(false),
            "-f86" => f86 = true,
            "-o" => {
                let value = args.next().ok_or_else(|| fw::Error::Summary(usage.into()))?;
                output = Some(PathBuf::from(value));
            }
            _ => {
                if input.is_some() {
                    return Err(fw::Error::Summary(usage.into()));
                }
                input = Some(PathBuf::from(arg));
            }
        }
    }

    let decode = mode.ok_or_else(|| fw::Error::Summary(usage.into()))?;
    let output = output.ok_or_else(|| fw::Error::Summary(usage.into()))?;
    let input = input.ok_or_else(|| fw::Error::Summary(usage.into()))?;
    Ok(Args { decode, f86, output, input })
}

fn main() -> ExitCode {
    env_logger::init();
    let args = std::env::args().skip(1).collect::<Vec<_>>().into_iter();
    match parse_args(args).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("glzma: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> fw::Result<()> {
    let data = std::fs::read(&args.input)?;
    let codec: Box<dyn Codec> = if args.f86 { Box::new(LzmaX86Codec) } else { Box::new(LzmaCodec) };
    let out = if args.decode { codec.decompress(&data)? } else { codec.compress(&data)? };
    std::fs::write(&args.output, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tokens: &[&str]) -> fw::Result<Args> {
        parse_args(tokens.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter())
    }

    #[test]
    fn parses_decode_with_f86_and_output() {
        let args = parse(&["-d", "-f86", "-o", "out.bin", "in.bin"]).unwrap();
        assert!(args.decode);
        assert!(args.f86);
        assert_eq!(args.output, PathBuf::from("out.bin"));
        assert_eq!(args.input, PathBuf::from("in.bin"));
    }

    #[test]
    fn parses_encode_without_f86() {
        let args = parse(&["-e", "-o", "out.bin", "in.bin"]).unwrap();
        assert!(!args.decode);
        assert!(!args.f86);
    }

    #[test]
    fn rejects_missing_mode() {
        assert!(parse(&["-o", "out.bin", "in.bin"]).is_err());
    }

    #[test]
    fn rejects_missing_output() {
        assert!(parse(&["-d", "in.bin"]).is_err());
    }
}
