// Tape Code Generator
//
// Walks a planned TapeLayout and emits the write sequence for each region in
// dependency order: strings, argv table, envp table, then the frame that
// references all of them. The program ends by returning the head to the frame
// and firing the trigger.

use crate::tape_compiler::emitter::ProgramBuilder;
use crate::tape_compiler::layout::{PointerTable, RegionKind, TapeLayout, FRAME_BASE};
use log::debug;

pub struct TapeCodeGen {
    tape_base: u64,
    builder: ProgramBuilder,
}

impl TapeCodeGen {
    pub fn new(tape_base: u64) -> Self {
        TapeCodeGen {
            tape_base,
            builder: ProgramBuilder::new(),
        }
    }

    pub fn generate(mut self, layout: &TapeLayout) -> String {
        self.emit_strings(layout);
        self.emit_pointer_table(RegionKind::ArgvTable, &layout.argv, layout);
        self.emit_pointer_table(RegionKind::EnvTable, &layout.envp, layout);
        self.emit_frame(layout);

        self.builder.trigger_at(FRAME_BASE);
        debug!(
            "⚡ Trigger at offset {} after {} cells written",
            FRAME_BASE,
            self.builder.cells_written()
        );
        self.builder.finish()
    }

    fn emit_strings(&mut self, layout: &TapeLayout) {
        for entry in layout.strings.entries() {
            self.builder.write_bytes_at(entry.offset, &entry.terminated());
        }
        debug!(
            "🔤 Wrote {} strings, cursor at {}",
            layout.strings.len(),
            self.builder.cursor()
        );
    }

    fn emit_pointer_table(&mut self, kind: RegionKind, table: &PointerTable, layout: &TapeLayout) {
        let bytes = table.encode(self.tape_base, &layout.strings);
        self.builder.write_bytes_at(table.base(), &bytes);
        debug!(
            "📋 Wrote {} ({} pointers + null), cursor at {}",
            kind,
            table.entries().len(),
            self.builder.cursor()
        );
    }

    fn emit_frame(&mut self, layout: &TapeLayout) {
        let bytes = layout.frame.encode();
        self.builder.write_bytes_at(FRAME_BASE, &bytes);
        debug!(
            "🧩 Wrote syscall {} frame ({} bytes), cursor at {}",
            layout.frame.number(),
            bytes.len(),
            self.builder.cursor()
        );
    }
}
