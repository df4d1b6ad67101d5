// sforge - script backend driver
// Loads a compilation unit archive and writes it in one of the four output formats

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use scriptforge::backend::{archive, Backend, BackendConfig, Engine, Target};

fn main() {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut input_file = "";
    let mut output_file = String::new();
    let mut config_file = String::new();
    let mut target: Option<Target> = None;
    let mut engine: Option<Engine> = None;
    let mut no_optimize = false;
    let mut legacy_header = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                output_file = option_value(&args, i, "a filename").to_string();
                i += 2;
            }
            "-c" | "--config" => {
                config_file = option_value(&args, i, "a filename").to_string();
                i += 2;
            }
            "-t" | "--target" => {
                let value = option_value(&args, i, "flat, chunked, tokens, or text");
                target = match value.parse() {
                    Ok(t) => Some(t),
                    Err(err) => {
                        eprintln!("Error: {}", err);
                        process::exit(1);
                    }
                };
                i += 2;
            }
            "--engine" => {
                let value = option_value(&args, i, "zdoom, zandronum, eternity, or hexen");
                engine = match value.parse() {
                    Ok(e) => Some(e),
                    Err(err) => {
                        eprintln!("Error: {}", err);
                        process::exit(1);
                    }
                };
                i += 2;
            }
            "--no-optimize" => {
                no_optimize = true;
                i += 1;
            }
            "--legacy-header" => {
                legacy_header = true;
                i += 1;
            }
            "-v" | "--verbose" => {
                verbose = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option '{}'", arg);
                print_usage(&args[0]);
                process::exit(1);
            }
            _ => {
                if input_file.is_empty() {
                    input_file = &args[i];
                } else {
                    eprintln!("Error: Multiple input files specified");
                    process::exit(1);
                }
                i += 1;
            }
        }
    }

    if input_file.is_empty() {
        eprintln!("Error: No input file specified");
        print_usage(&args[0]);
        process::exit(1);
    }

    // Configuration file first, command line on top
    let mut config = if config_file.is_empty() {
        BackendConfig::default()
    } else {
        match BackendConfig::load(Path::new(&config_file)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        }
    };
    if let Some(target) = target {
        config.target = target;
    }
    if let Some(engine) = engine {
        config.engine = engine;
    }
    if no_optimize {
        config.optimize = false;
    }
    if legacy_header {
        config.legacy_header = true;
    }

    if output_file.is_empty() {
        let input_path = Path::new(input_file);
        let base_name = input_path.file_stem().unwrap_or_else(|| {
            eprintln!("Error: Invalid input filename");
            process::exit(1);
        });

        let extension = match config.target {
            Target::Flat | Target::Chunked => "o",
            Target::Tokens => "tok",
            Target::Text => "txt",
        };

        output_file = format!("{}.{}", base_name.to_string_lossy(), extension);
    }

    if verbose {
        println!(
            "Compiling {} -> {} ({}, {})",
            input_file, output_file, config.target, config.engine
        );
    }

    let ctx = match archive::load(Path::new(input_file)) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("Error reading '{}': {}", input_file, err);
            process::exit(1);
        }
    };

    let backend = Backend::new(config);
    match backend.compile(&ctx) {
        Ok(output) => {
            let data_size = output.len();

            if let Err(err) = fs::write(&output_file, output) {
                eprintln!("Error writing '{}': {}", output_file, err);
                process::exit(1);
            }

            if verbose {
                println!("Successfully wrote {} bytes to {}", data_size, output_file);
            }
        }
        Err(err) => {
            eprintln!("Compilation error: {}", err);
            process::exit(1);
        }
    }
}

fn option_value<'a>(args: &'a [String], i: usize, what: &str) -> &'a str {
    if i + 1 >= args.len() {
        eprintln!("Error: {} requires {}", args[i], what);
        process::exit(1);
    }
    &args[i + 1]
}

fn print_usage(program_name: &str) {
    println!("Usage: {} [options] <unit.sfar>", program_name);
    println!();
    println!("Options:");
    println!("  -o, --output <file>    Output filename (default: unit.o / .tok / .txt)");
    println!("  -t, --target <format>  flat, chunked, tokens, or text (default: chunked)");
    println!("  -c, --config <file>    TOML configuration file");
    println!("  --engine <name>        zdoom, zandronum, eternity, or hexen (default: zdoom)");
    println!("  --no-optimize          Skip instruction optimization");
    println!("  --legacy-header        Chunked output readable by flat-format loaders");
    println!("  -v, --verbose          Verbose output");
    println!("  -h, --help             Show this help message");
    println!();
    println!("Examples:");
    println!(
        "  {} map01.sfar                    # Chunked object map01.o",
        program_name
    );
    println!(
        "  {} -t flat --engine hexen a.sfar # Flat image for hexen",
        program_name
    );
}
