// Tape Program Inspector
// Runs a generated program on a simulated tape and prints the syscall it triggers

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use tapegen::tape_base::parse_hex_address;
use tapegen::tape_vm::{TapeMachine, DEFAULT_TAPE_LEN};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = match env::args_os().map(|arg| arg.into_string()).collect() {
        Ok(args) => args,
        Err(arg) => {
            eprintln!("Error: Argument is not valid UTF-8: {:?}", arg);
            process::exit(1);
        }
    };
    let program_name = args.first().map(String::as_str).unwrap_or("tape-inspect");

    let mut tape_base: u64 = 0;
    let mut seed: u64 = 0;
    let mut tape_len = DEFAULT_TAPE_LEN;
    let mut input: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base" | "--seed" | "--tape-len" if i + 1 >= args.len() => {
                eprintln!("Error: {} requires a value", args[i]);
                process::exit(1);
            }
            "--base" => {
                tape_base = parse_hex_address(&args[i + 1])
                    .ok_or_else(|| format!("Invalid base address: {}", args[i + 1]))?;
                i += 2;
            }
            "--seed" => {
                seed = args[i + 1].parse()?;
                i += 2;
            }
            "--tape-len" => {
                tape_len = args[i + 1].parse()?;
                i += 2;
            }
            "-h" | "--help" => {
                print_usage(program_name);
                return Ok(());
            }
            arg => {
                if input.is_some() {
                    eprintln!("Error: Multiple programs specified");
                    process::exit(1);
                }
                input = Some(arg);
                i += 1;
            }
        }
    }

    let Some(input) = input else {
        print_usage(program_name);
        process::exit(1);
    };

    let program = if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input)?
    };

    let mut vm = TapeMachine::new(tape_base, tape_len, seed);
    let head = match vm.run(&program) {
        Ok(head) => head,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    println!("=== Trigger at cell {} after {} steps ===", head, vm.steps());

    let syscall = match vm.syscall_at(head) {
        Ok(syscall) => syscall,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };
    println!("syscall {} with {} args", syscall.number, syscall.args.len());
    for (n, arg) in syscall.args.iter().enumerate() {
        println!("  arg{}: 0x{:x}", n, arg);
    }

    match vm.execve_at(head) {
        Ok(call) => {
            println!("\n=== execve ===");
            println!("path: {}", call.path);
            for (n, arg) in call.argv.iter().enumerate() {
                println!("argv[{}]: {}", n, arg);
            }
            if call.envp.is_empty() {
                println!("envp: (empty)");
            }
            for (n, var) in call.envp.iter().enumerate() {
                println!("envp[{}]: {}", n, var);
            }
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }

    Ok(())
}

fn print_usage(program_name: &str) {
    println!(
        "Usage: {} [--base <hex>] [--seed <n>] [--tape-len <cells>] <program.bf|->",
        program_name
    );
    println!();
    println!("The tape starts with seeded random contents, like uninitialized memory.");
    println!("Use the same --base the program was generated with.");
}
