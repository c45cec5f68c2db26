use clap::{App, Arg, ArgMatches};
use slog::{o, Drain, Logger};

use tern::source::Module;

enum Error {
    Pipeline(tern::Error),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<tern::Error> for Error {
    fn from(e: tern::Error) -> Error {
        Error::Pipeline(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("ternc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for compiling Tern programs to stack-machine assembly")
        .arg(Arg::with_name("source")
             .help("File containing Tern source text")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("output")
             .help("Write the result to this file instead of standard output")
             .short("o")
             .long("output")
             .takes_value(true))
        .arg(Arg::with_name("emit")
             .help("What to produce: assembly or a tree file")
             .long("emit")
             .takes_value(true)
             .possible_values(&["asm", "tree"])
             .default_value("asm"))
        .arg(Arg::with_name("verbose")
             .help("Enable trace logging to standard error")
             .short("v")
             .long("verbose"))
        .get_matches()
}

fn terminal_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

fn main() {
    let args = parse_arguments();

    match run(&args) {
        Ok(()) => (),
        Err(Error::IO(io)) => {
            eprintln!("IO error: {}", io);
            std::process::exit(1);
        }
        Err(Error::Pipeline(err)) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn run(args: &ArgMatches) -> Result<(), Error> {
    let file_path = args.value_of("source").unwrap();
    let text = std::fs::read_to_string(file_path)?;

    let logger = if args.is_present("verbose") {
        Some(terminal_logger())
    } else {
        None
    };

    let module = Module::parse_with_logger(&text, logger.clone())?;

    let output = match args.value_of("emit") {
        Some("tree") => module.save(),
        _ => module.compile_with_logger(logger)?,
    };

    match args.value_of("output") {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }

    Ok(())
}
