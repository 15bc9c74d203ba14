/// Tape base address resolution
///
/// The emitted program stores absolute pointers (argv/envp entries) that only
/// make sense once the runtime address of the engine's tape is known. This
/// module finds that address by trying, in order:
///
/// 1. The `TAPE_BASE` environment override (hex, optional `0x` prefix)
/// 2. Asking a debugger to print `&tape` for the compiled engine
/// 3. Scanning the engine's symbol table for the `tape` symbol
///
/// The first probe that succeeds wins. Tool failures only disqualify the probe
/// that hit them; running out of probes is fatal.
use crate::config::ResolverConfig;
use log::{debug, info};
use regex::Regex;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::process::{Command, Stdio};

/// Environment variable that overrides every introspection probe
pub const TAPE_BASE_ENV: &str = "TAPE_BASE";

lazy_static! {
    // `$1 = (unsigned char (*)[30000]) 0x4c6f00 <tape>`
    static ref DEBUGGER_ADDRESS: Regex =
        Regex::new(r"\$\d+\s*=\s*\(.*\)\s*(0x[0-9a-fA-F]+)").unwrap();
}

/// Resolution strategies in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Override,
    Debugger,
    SymbolTable,
}

pub const PROBE_ORDER: [Probe; 3] = [Probe::Override, Probe::Debugger, Probe::SymbolTable];

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Probe::Override => write!(f, "{} override", TAPE_BASE_ENV),
            Probe::Debugger => write!(f, "debugger"),
            Probe::SymbolTable => write!(f, "symbol table"),
        }
    }
}

/// Why a single probe did not produce an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    NotSet,
    InvalidOverride(String),
    Launch(String, String),    // program, reason
    Exit(String, Option<i32>), // program, exit code
    NoMatch(String),           // what was searched for
    Malformed(String),         // offending text
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeFailure::NotSet => write!(f, "not set"),
            ProbeFailure::InvalidOverride(value) => {
                write!(f, "'{}' is not a hexadecimal address", value)
            }
            ProbeFailure::Launch(program, reason) => {
                write!(f, "failed to launch '{}': {}", program, reason)
            }
            ProbeFailure::Exit(program, Some(code)) => {
                write!(f, "'{}' exited with status {}", program, code)
            }
            ProbeFailure::Exit(program, None) => {
                write!(f, "'{}' was terminated by a signal", program)
            }
            ProbeFailure::NoMatch(what) => write!(f, "no {} found in output", what),
            ProbeFailure::Malformed(text) => write!(f, "cannot parse address from '{}'", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The override was given but is not an address
    InvalidOverride(String),
    /// Every probe failed
    Exhausted(Vec<(Probe, ProbeFailure)>),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::InvalidOverride(value) => write!(
                f,
                "Invalid {} value '{}'. Expected a hex address like 0x4c6f00.",
                TAPE_BASE_ENV, value
            ),
            ResolveError::Exhausted(failures) => {
                write!(
                    f,
                    "Could not determine {}. Set env {}=0x... and rerun.",
                    TAPE_BASE_ENV, TAPE_BASE_ENV
                )?;
                for (probe, failure) in failures {
                    write!(f, "\n  {}: {}", probe, failure)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// One blocking external tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    /// Append stderr to the captured text (gdb prints some results there)
    pub merge_stderr: bool,
}

/// Runs external tools for the introspection probes
pub trait CommandRunner {
    /// Run to completion and return the captured output.
    /// A launch failure or a non-zero exit is a probe failure.
    fn capture(&self, invocation: &ToolInvocation) -> Result<String, ProbeFailure>;
}

/// Runs tools as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn capture(&self, invocation: &ToolInvocation) -> Result<String, ProbeFailure> {
        debug!("Running {} {:?}", invocation.program, invocation.args);

        // output() waits for the child and reaps it on every path
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ProbeFailure::Launch(invocation.program.clone(), e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeFailure::Exit(
                invocation.program.clone(),
                output.status.code(),
            ));
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if invocation.merge_stderr {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(text)
    }
}

pub struct TapeBaseResolver<'a, R: CommandRunner> {
    config: &'a ResolverConfig,
    runner: R,
    override_value: Option<String>,
}

impl<'a, R: CommandRunner> TapeBaseResolver<'a, R> {
    pub fn new(config: &'a ResolverConfig, runner: R, override_value: Option<String>) -> Self {
        TapeBaseResolver {
            config,
            runner,
            override_value,
        }
    }

    /// Resolver that takes its override from the process environment
    pub fn from_env(config: &'a ResolverConfig, runner: R) -> Self {
        Self::new(config, runner, env::var(TAPE_BASE_ENV).ok())
    }

    pub fn resolve(&self) -> Result<u64, ResolveError> {
        let mut failures = Vec::new();

        for probe in PROBE_ORDER {
            match self.run_probe(probe) {
                Ok(address) => {
                    info!("Tape base 0x{:x} (from {})", address, probe);
                    return Ok(address);
                }
                Err(ProbeFailure::InvalidOverride(value)) => {
                    return Err(ResolveError::InvalidOverride(value));
                }
                Err(failure) => {
                    debug!("Probe '{}' failed: {}", probe, failure);
                    failures.push((probe, failure));
                }
            }
        }

        Err(ResolveError::Exhausted(failures))
    }

    pub fn run_probe(&self, probe: Probe) -> Result<u64, ProbeFailure> {
        match probe {
            Probe::Override => self.probe_override(),
            Probe::Debugger => self.probe_debugger(),
            Probe::SymbolTable => self.probe_symbol_table(),
        }
    }

    fn probe_override(&self) -> Result<u64, ProbeFailure> {
        match self.override_value.as_deref() {
            None => Err(ProbeFailure::NotSet),
            Some(value) if value.trim().is_empty() => Err(ProbeFailure::NotSet),
            Some(value) => parse_hex_address(value)
                .ok_or_else(|| ProbeFailure::InvalidOverride(value.to_string())),
        }
    }

    fn probe_debugger(&self) -> Result<u64, ProbeFailure> {
        let invocation = ToolInvocation {
            program: self.config.debugger.clone(),
            args: vec![
                "-q".into(),
                self.config.target_binary.clone().into_os_string(),
                "-ex".into(),
                format!("p &{}", self.config.tape_symbol).into(),
                "-ex".into(),
                "quit".into(),
            ],
            merge_stderr: true,
        };
        let output = self.runner.capture(&invocation)?;
        parse_debugger_output(&output)
    }

    fn probe_symbol_table(&self) -> Result<u64, ProbeFailure> {
        let invocation = ToolInvocation {
            program: self.config.symbol_tool.clone(),
            args: vec![
                "-an".into(),
                self.config.target_binary.clone().into_os_string(),
            ],
            merge_stderr: false,
        };
        let output = self.runner.capture(&invocation)?;
        parse_symbol_listing(&output, &self.config.tape_symbol)
    }
}

/// Parse a hex address with or without a `0x` prefix
pub fn parse_hex_address(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Extract the address from a debugger `print` result such as
/// `$1 = (unsigned char (*)[30000]) 0x4c6f00 <tape>`
pub fn parse_debugger_output(output: &str) -> Result<u64, ProbeFailure> {
    let captures = DEBUGGER_ADDRESS
        .captures(output)
        .ok_or_else(|| ProbeFailure::NoMatch("'$N = (type) 0x...' result".to_string()))?;
    let literal = &captures[1];
    parse_hex_address(literal).ok_or_else(|| ProbeFailure::Malformed(literal.to_string()))
}

/// Find `symbol` in `nm`-style output (`<hex address> <kind> <name>` per line)
pub fn parse_symbol_listing(output: &str, symbol: &str) -> Result<u64, ProbeFailure> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields.last() != Some(&symbol) {
            continue;
        }
        return parse_hex_address(fields[0]).ok_or_else(|| ProbeFailure::Malformed(line.to_string()));
    }
    Err(ProbeFailure::NoMatch(format!("symbol '{}'", symbol)))
}
