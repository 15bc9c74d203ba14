// tapegen - execve program generator for the systemf tape engine
// Emits a tape program that runs curl against the background-removal API

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process;

use log::debug;
use tapegen::config::Config;
use tapegen::exec_request::ExecRequest;
use tapegen::tape_base::{SystemRunner, TapeBaseResolver};
use tapegen::tape_compiler::TapeCompiler;

fn main() {
    // Initialize logging
    env_logger::init();

    let args: Vec<OsString> = env::args_os().collect();
    let program_name = args
        .first()
        .and_then(|name| name.to_str())
        .unwrap_or("tapegen")
        .to_string();

    let mut config_path: Option<PathBuf> = None;
    let mut positional: Vec<&OsString> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].to_str() {
            Some("-c") | Some("--config") => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a filename");
                    process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            Some("-h") | Some("--help") => {
                print_usage(&program_name);
                process::exit(0);
            }
            _ => {
                positional.push(&args[i]);
                i += 1;
            }
        }
    }

    if positional.len() < 3 {
        eprint_usage(&program_name);
        process::exit(1);
    }
    let (image_path, output_path) = (Path::new(positional[1]), Path::new(positional[2]));
    let Some(api_key) = positional[0].to_str() else {
        eprintln!("Error: API key is not valid UTF-8");
        process::exit(1);
    };

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };
    debug!("Using config: {:?}", config);

    let request = match ExecRequest::background_removal(
        &config.request,
        api_key,
        image_path,
        output_path,
    ) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    let tape_base = match TapeBaseResolver::from_env(&config.resolver, SystemRunner).resolve() {
        Ok(address) => address,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    match TapeCompiler::new(config.layout).compile(&request, tape_base) {
        Ok(program) => println!("{}", program),
        Err(err) => {
            eprintln!("Compilation error: {}", err);
            process::exit(1);
        }
    }
}

fn usage_line(program_name: &str) -> String {
    format!(
        "Usage: {} [--config <file>] <API_KEY> <ABS_IMAGE_PATH> <OUTPUT_PATH>",
        program_name
    )
}

fn eprint_usage(program_name: &str) {
    eprintln!("{}", usage_line(program_name));
}

fn print_usage(program_name: &str) {
    println!("{}", usage_line(program_name));
    println!();
    println!("Prints a systemf tape program that execs curl to upload the image");
    println!("to the background-removal API and save the result.");
    println!();
    println!("Options:");
    println!("  -c, --config <file>    TOML config (default: ./tapegen.toml if present)");
    println!("  -h, --help             Show this help message");
    println!();
    println!("Environment:");
    println!("  TAPE_BASE              Tape address in hex, skips gdb/nm probing");
    println!("  RUST_LOG               Log level for diagnostics on stderr");
    println!();
    println!("Examples:");
    println!(
        "  TAPE_BASE=0x4c6f00 {} $KEY /abs/in.jpg /abs/out.png > run.bf",
        program_name
    );
}
