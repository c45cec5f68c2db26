use clap::{App, Arg, ArgMatches};

use tern::treefile;

fn parse_arguments() -> ArgMatches<'static> {
    App::new("ternrev")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for restoring Tern source text from a tree file")
        .arg(Arg::with_name("tree")
             .help("File containing a saved tree")
             .value_name("TREE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("output")
             .help("Write the restored source to this file instead of standard output")
             .short("o")
             .long("output")
             .takes_value(true))
        .get_matches()
}

fn main() {
    let args = parse_arguments();

    let file_path = args.value_of("tree").unwrap();
    let text = match std::fs::read_to_string(file_path) {
        Ok(text) => text,
        Err(io) => {
            eprintln!("IO error: {}", io);
            std::process::exit(1);
        }
    };

    let module = match treefile::load(&text) {
        Ok(module) => module,
        Err(err) => {
            eprintln!("tree file error: {}", err.verbose(&text));
            std::process::exit(1);
        }
    };

    let source = module.restore();

    match args.value_of("output") {
        Some(path) => {
            if let Err(io) = std::fs::write(path, source) {
                eprintln!("IO error: {}", io);
                std::process::exit(1);
            }
        }
        None => print!("{}", source),
    }
}
