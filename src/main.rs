use clap::{Arg, ArgAction, Command};
use color_eyre::eyre::{eyre, Report, Result};
use lexforge::{BackendOptions, BackendRegistry, Grammar, LexicalAnalyzer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Command::new("lexforge")
        .version("1.0")
        .about("Compile a lexical grammar into minimized DFAs and emit them for a target language")
        .arg(
            Arg::new("grammar")
                .short('g')
                .long("grammar")
                .help("Grammar model to compile, as json")
                .value_name("GRAMMAR FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("language")
                .short('l')
                .long("language")
                .help("Output language, one of the registered backends")
                .value_name("LANGUAGE")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .help("Directory the emitted files are written to")
                .value_name("DIRECTORY")
                .default_value(".")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("file-name")
                .short('f')
                .long("file-name")
                .help("Base name of the emitted files")
                .value_name("NAME")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("namespace")
                .short('n')
                .long("namespace")
                .help("Namespace for the emitted code")
                .value_name("NAMESPACE")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("list-languages")
                .long("list-languages")
                .help("List the available output languages and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase logging, repeat for more detail")
                .action(ArgAction::Count),
        )
        .get_matches();

    // RUST_LOG takes precedence over the verbosity flag
    let default_level = match args.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = BackendRegistry::with_builtins();

    if args.get_flag("list-languages") {
        eprint!("{}", registry.describe());
        return Ok(());
    }

    let grammar_path = args
        .get_one::<PathBuf>("grammar")
        .ok_or_else(|| eyre!("Error: A grammar file must be provided!"))?;

    let options = BackendOptions::new(
        args.get_one::<String>("file-name").cloned(),
        args.get_one::<String>("namespace").cloned(),
    )
    .map_err(Report::new)?;

    let output_dir = args
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let grammar = Grammar::load(grammar_path)?;
    let analyzer = LexicalAnalyzer::compile(&grammar)?;

    let language = args.get_one::<String>("language").map(String::as_str);
    let written = registry.emit(language, &analyzer, &options, &output_dir)?;

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
