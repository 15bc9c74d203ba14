// Tape Compiler Module
// Turns an execve request into a straight-line program for the tape engine

pub mod codegen;
pub mod emitter;
pub mod error;
pub mod frame;
pub mod layout;

#[cfg(test)]
mod emitter_tests;

use crate::config::LayoutConfig;
use crate::exec_request::ExecRequest;
use log::info;

pub use error::CompilerError;

/// Main compiler structure
pub struct TapeCompiler {
    layout: LayoutConfig,
}

impl Default for TapeCompiler {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl TapeCompiler {
    pub fn new(layout: LayoutConfig) -> Self {
        TapeCompiler { layout }
    }

    /// Compile a request against a resolved tape base address.
    ///
    /// The whole program is built in memory; on error nothing is returned.
    pub fn compile(&self, request: &ExecRequest, tape_base: u64) -> Result<String, CompilerError> {
        // Phase 1: fixed offsets for every region
        let layout = layout::TapeLayout::plan(&self.layout, request)?;
        layout.log_regions();

        // Phase 2: write sequence and trigger
        let program = codegen::TapeCodeGen::new(tape_base).generate(&layout);

        info!(
            "Generated {} operations for {} ({} argv entries, tape base 0x{:x})",
            program.len(),
            request.path,
            request.argv.len(),
            tape_base
        );
        Ok(program)
    }
}
