//! Compiler driver: argument surface, backend wiring, fault printing
//! and the listing pass.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::Parser;

use sdl_rs::backend::c::CBackend;
use sdl_rs::backend::{Backend, EmitConfig};
use sdl_rs::dispatch::Dispatcher;
use sdl_rs::error::{SdlError, Severity};
use sdl_rs::listing::ListingWriter;
use sdl_rs::parser::parse_source_traced;
use sdl_rs::{AlignMode, Target};

/// Structure Definition Language compiler
#[derive(Clone, Debug, Parser)]
#[command(name = "sdlc", version)]
struct Args {
    /// input SDL source file
    input: Option<PathBuf>,

    /// default member alignment: 0 packs, N pads up to N bytes
    #[arg(long, default_value_t = 0)]
    align: u32,

    /// 32-bit pointer target
    #[arg(long)]
    b32: bool,
    /// 64-bit pointer target (the default)
    #[arg(long)]
    b64: bool,

    /// validate aggregate layout after every close
    #[arg(long)]
    check: bool,
    #[arg(long, conflicts_with = "check")]
    nocheck: bool,

    /// carry source comments into the output
    #[arg(long)]
    comments: bool,
    #[arg(long, conflicts_with = "comments")]
    nocomments: bool,

    /// copy sdl_copyright.txt into the output header
    #[arg(long)]
    copy: bool,
    #[arg(long, conflicts_with = "copy")]
    nocopy: bool,

    /// emit the module header block
    #[arg(long)]
    header: bool,
    #[arg(long, conflicts_with = "header")]
    noheader: bool,

    /// write a listing file (optionally to the named file)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    list: Option<String>,
    #[arg(long)]
    nolist: bool,

    /// always pad members to their natural alignment
    #[arg(long)]
    member: bool,
    #[arg(long, conflicts_with = "member")]
    nomember: bool,

    /// suppress prefix or tag in emitted names (both when bare)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    suppress: Option<String>,
    #[arg(long)]
    nosuppress: bool,

    /// output language, repeatable: name or name=file
    #[arg(long)]
    lang: Vec<String>,

    /// conditional symbol binding, repeatable: name=value
    #[arg(long)]
    symbol: Vec<String>,

    /// trace statements while parsing
    #[arg(long)]
    trace: bool,
    /// print a compilation summary
    #[arg(long)]
    verbose: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse();
    let mut cli_faults: Vec<SdlError> = Vec::new();
    let mut fatal = false;

    let align = match args.align {
        0 | 1 | 2 | 4 | 8 => args.align,
        bad => {
            cli_faults.push(SdlError::InvalidAlignment { value: bad });
            0
        }
    };
    let target = Target {
        pointer_bytes: if args.b32 && !args.b64 { 4 } else { 8 },
        align: if args.member && !args.nomember {
            AlignMode::Natural
        } else if align > 0 {
            AlignMode::Limit(align)
        } else {
            AlignMode::Packed
        },
    };

    let Some(input) = args.input.clone() else {
        eprintln!("{}", SdlError::NoInputFile);
        return 1;
    };
    let source = match std::fs::read_to_string(&input) {
        Ok(text) => text,
        Err(err) => {
            eprintln!(
                "{}",
                SdlError::InputFileOpen {
                    path: input.display().to_string(),
                    detail: err.to_string(),
                }
            );
            return 1;
        }
    };

    let (suppress_prefix, suppress_tag) = match args
        .suppress
        .as_deref()
        .filter(|_| !args.nosuppress)
    {
        None => (false, false),
        Some("") => (true, true),
        Some("prefix") => (true, false),
        Some("tag") => (false, true),
        Some(other) => {
            cli_faults.push(SdlError::InvalidQualifier {
                qualifier: format!("suppress={other}"),
            });
            (false, false)
        }
    };
    let copy_text = if args.copy && !args.nocopy {
        let copy_path = input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("sdl_copyright.txt");
        match std::fs::read_to_string(&copy_path) {
            Ok(text) => Some(text),
            Err(_) => {
                cli_faults.push(SdlError::NoCopyFile {
                    path: copy_path.display().to_string(),
                });
                None
            }
        }
    } else {
        None
    };
    let cfg = EmitConfig {
        header: args.header || !args.noheader,
        comments: args.comments || !args.nocomments,
        suppress_prefix,
        suppress_tag,
        copy_text,
    };

    let mut backends: Vec<Box<dyn Backend>> = Vec::new();
    let mut seen = Vec::new();
    for spec in &args.lang {
        let (name, file) = match spec.split_once('=') {
            Some((n, f)) => (n.to_ascii_lowercase(), Some(f)),
            None => (spec.to_ascii_lowercase(), None),
        };
        if seen.contains(&name) {
            cli_faults.push(SdlError::DuplicateLanguage {
                name: name.clone(),
            });
            continue;
        }
        match name.as_str() {
            "c" | "cc" => {
                let path = match file {
                    Some(f) => PathBuf::from(f),
                    None => input.with_extension("h"),
                };
                let out = match File::create(&path) {
                    Ok(f) => BufWriter::new(f),
                    Err(err) => {
                        eprintln!(
                            "{}",
                            SdlError::OutputFileOpen {
                                path: path.display().to_string(),
                                detail: err.to_string(),
                            }
                        );
                        return 1;
                    }
                };
                backends.push(Box::new(CBackend::new(out, cfg.clone())));
                seen.push(name);
            }
            other => {
                cli_faults.push(SdlError::InvalidQualifier {
                    qualifier: format!("lang={other}"),
                });
            }
        }
    }
    if backends.is_empty() {
        eprintln!("{}", SdlError::NoOutput);
        return 1;
    }

    let mut symbols = HashMap::new();
    for binding in &args.symbol {
        match binding.split_once('=') {
            Some((name, value)) => match value.parse::<i64>() {
                Ok(v) => {
                    symbols.insert(name.to_string(), v);
                }
                Err(_) => {
                    cli_faults.push(SdlError::InvalidQualifier {
                        qualifier: format!("symbol={binding}"),
                    });
                }
            },
            None => {
                symbols.insert(binding.clone(), 1);
            }
        }
    }

    let mut dispatcher = Dispatcher::new(target, symbols, backends)
        .with_check(!args.nocheck && args.check);
    if let Err(err) =
        parse_source_traced(&source, &mut dispatcher, args.trace)
    {
        eprintln!("{err}");
        fatal = true;
    }

    for fault in cli_faults.iter() {
        eprintln!("{fault}");
        fatal |= fault.severity() == Severity::Fatal;
    }
    for fault in dispatcher.faults() {
        eprintln!("{fault}");
    }
    fatal |= dispatcher.fatal_count() > 0;

    if args.list.is_some() && args.nolist {
        eprintln!("{}", SdlError::DuplicateListingQualifier);
    }
    if let Some(list) = args.list.as_deref().filter(|_| !args.nolist) {
        let path = if list.is_empty() {
            input.with_extension("lis")
        } else {
            PathBuf::from(list)
        };
        let title = format!(
            "sdl-rs {}  {}",
            env!("CARGO_PKG_VERSION"),
            input.display()
        );
        let listing = File::create(&path)
            .map(BufWriter::new)
            .map(|out| {
                ListingWriter::new(out, &title)
                    .render(&source, dispatcher.faults())
            });
        match listing {
            Ok(Ok(())) => {}
            Ok(Err(err)) | Err(err) => {
                eprintln!(
                    "{}",
                    SdlError::OutputFileOpen {
                        path: path.display().to_string(),
                        detail: err.to_string(),
                    }
                );
                fatal = true;
            }
        }
    }

    if args.verbose {
        let modules = dispatcher.modules();
        eprintln!(
            "sdlc: {} module(s), {} aggregate(s), {} constant(s), {} fault(s)",
            modules.len(),
            modules.iter().map(|m| m.aggregates.len()).sum::<usize>(),
            modules.iter().map(|m| m.constants.len()).sum::<usize>(),
            dispatcher.faults().len(),
        );
    }

    if fatal {
        1
    } else {
        0
    }
}
