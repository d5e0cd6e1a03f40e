
//! Command line front-end: parallel decompression of gzip and bgzf files,
//! with optional import and export of seek indexes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use pargz::prelude::*;

const EXIT_ARGUMENT_ERROR: u8 = 1;
const EXIT_DECODE_ERROR: u8 = 2;
const EXIT_IO_ERROR: u8 = 3;


#[derive(Debug, Parser)]
#[command(name = "pargz", version, about = "Parallel gzip and bgzf decompression")]
struct Arguments {

    /// Decompress the input (the only mode, accepted for familiarity).
    #[arg(short = 'd', long = "decompress")]
    decompress: bool,

    /// Keep the input file instead of removing it after decompression.
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Write the decompressed output to standard output.
    #[arg(short = 'c', long = "stdout")]
    to_stdout: bool,

    /// Number of decoder threads. Defaults to the number of CPU cores.
    #[arg(short = 'P', long = "threads")]
    threads: Option<usize>,

    /// Import this index if the file exists, export to it otherwise.
    #[arg(long = "index-file")]
    index_file: Option<PathBuf>,

    /// Use an existing index for O(1) seeks and verified sizes.
    #[arg(long = "import-index")]
    import_index: Option<PathBuf>,

    /// Write an index for the input after decompressing it.
    #[arg(long = "export-index")]
    export_index: Option<PathBuf>,

    /// The file to decompress; standard input when omitted or "-".
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let arguments = match Arguments::try_parse() {
        Ok(arguments) => arguments,
        Err(error) => {
            // clap renders --help and --version through this path, too
            let _ = error.print();
            return match error.kind() {
                clap::error::ErrorKind::DisplayHelp
                | clap::error::ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_ARGUMENT_ERROR),
            };
        },
    };

    match run(&arguments) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("pargz: {}", error);
            ExitCode::from(match error {
                Error::Io(_) => EXIT_IO_ERROR,
                Error::Invalid(_) | Error::NotSupported(_) | Error::Decode(_) => EXIT_DECODE_ERROR,
            })
        },
    }
}

fn run(arguments: &Arguments) -> Result<()> {
    // compressing is out of scope; -d merely spells out the only mode
    let _ = arguments.decompress;

    let from_stdin = matches!(&arguments.file, None)
        || matches!(&arguments.file, Some(path) if path.as_os_str() == "-");

    let source: Box<dyn FileReader> =
        if from_stdin { Box::new(BufferedFileReader::drain(std::io::stdin().lock())?) }
        else {
            let path = arguments.file.as_ref().expect("file path present unless reading stdin");
            Box::new(StandardFileReader::open(path)?)
        };

    let mut options = ReaderOptions::default();
    if let Some(threads) = arguments.threads {
        options = options.with_thread_count(threads);
    }

    let mut reader = ParallelGzipReader::with_options(source, options);

    let import_path = arguments.import_index.clone().or_else(||
        arguments.index_file.clone().filter(|path| path.exists()));

    if let Some(path) = import_path {
        let mut file = BufReader::new(File::open(&path)?);
        reader.import_index(read_index(&mut file)?)?;
    }

    if from_stdin || arguments.to_stdout {
        let stdout = std::io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
    }
    else {
        let input = arguments.file.as_ref().expect("file path present unless reading stdin");
        let output = output_path(input)?;

        let mut writer = BufWriter::new(File::create(&output)?);
        std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
    }

    let export_path = arguments.export_index.clone().or_else(||
        arguments.index_file.clone().filter(|path| !path.exists()));

    if let Some(path) = export_path {
        let index = reader.export_index(64 * 1024)?;
        let mut file = BufWriter::new(File::create(&path)?);
        write_index(&index, &mut file)?;
        file.flush()?;
    }

    if !arguments.keep && !arguments.to_stdout && !from_stdin {
        let input = arguments.file.as_ref().expect("file path present unless reading stdin");
        std::fs::remove_file(input)?;
    }

    Ok(())
}

/// The input path without its compression suffix.
fn output_path(input: &Path) -> Result<PathBuf> {
    let known_suffix = ["gz", "bgz", "bgzf", "gzip"].iter().any(|suffix|
        input.extension().map_or(false, |extension| extension.eq_ignore_ascii_case(suffix)));

    if !known_suffix {
        return Err(Error::Invalid(format!(
            "cannot derive an output name from {:?}; use --stdout", input,
        )));
    }

    Ok(input.with_extension(""))
}
