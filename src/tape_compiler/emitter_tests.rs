// Emitter Tests
//
// Head movement and cell writes must keep the compile-time cursor exactly in
// step with the engine head.

#[cfg(test)]
mod tests {
    use crate::tape_compiler::emitter::{movement, ProgramBuilder, TapeOp, CLEAR_CELL};
    use test_log::test;

    fn count(code: &str, op: TapeOp) -> usize {
        code.chars().filter(|&c| c == op.symbol()).count()
    }

    #[test]
    fn test_movement_steps_and_direction() {
        for cursor in 0..48 {
            for target in 0..48 {
                let (op, steps) = movement(cursor, target);
                assert_eq!(steps, cursor.abs_diff(target), "{} -> {}", cursor, target);
                if target > cursor {
                    assert_eq!(op, TapeOp::Forward);
                } else {
                    assert_eq!(op, TapeOp::Back);
                }
            }
        }
    }

    #[test]
    fn test_move_to_emits_single_run() {
        for (cursor, target) in [(0, 1000), (2100, 3), (7, 7), (1, 0)] {
            let mut builder = ProgramBuilder::new();
            builder.move_to(cursor);
            let before = builder.code().len();

            builder.move_to(target);
            let moved = &builder.code()[before..];
            let (op, steps) = movement(cursor, target);

            assert_eq!(moved.len(), steps);
            assert!(moved.chars().all(|c| c == op.symbol()));
            assert_eq!(builder.cursor(), target);
        }
    }

    #[test]
    fn test_write_bytes_cursor_lands_past_region() {
        let samples: [&[u8]; 5] = [b"", b"\0", b"curl\0", &[0xFF; 8], &[1, 2, 3, 0, 5]];
        for start in [0, 5, 1000] {
            for bytes in samples {
                let mut builder = ProgramBuilder::new();
                builder.move_to(42);
                builder.write_bytes_at(start, bytes);
                assert_eq!(builder.cursor(), start + bytes.len());
            }
        }
    }

    #[test]
    fn test_every_byte_is_cleared_first() {
        let mut builder = ProgramBuilder::new();
        builder.write_bytes_at(2, &[3, 0, 1]);

        let clear: String = CLEAR_CELL.iter().map(|op| op.symbol()).collect();
        assert_eq!(clear, "[-]");
        assert_eq!(
            builder.finish(),
            format!(">>{clear}+++>{clear}>{clear}+>", clear = clear)
        );
    }

    #[test]
    fn test_increment_count_matches_byte_value() {
        let bytes: Vec<u8> = vec![0, 1, 59, 128, 255];
        let mut builder = ProgramBuilder::new();
        builder.write_bytes_at(0, &bytes);
        let code = builder.finish();

        let total: usize = bytes.iter().map(|&b| b as usize).sum();
        assert_eq!(count(&code, TapeOp::Inc), total);
        assert_eq!(count(&code, TapeOp::Dec), bytes.len());
        assert_eq!(count(&code, TapeOp::Forward), bytes.len());
        assert_eq!(count(&code, TapeOp::Back), 0);
    }

    #[test]
    fn test_terminator_only_string_advances_one_cell() {
        let mut builder = ProgramBuilder::new();
        builder.move_to(1000);
        builder.write_bytes_at(1000, &[0]);
        assert_eq!(builder.cursor(), 1001);
        assert!(builder.code().ends_with("[-]>"));
        assert_eq!(builder.cells_written(), 1);
    }

    #[test]
    fn test_trigger_returns_to_frame() {
        let mut builder = ProgramBuilder::new();
        builder.write_bytes_at(0, &[59, 3]);
        builder.trigger_at(0);

        let code = builder.finish();
        assert!(code.ends_with("<<%"));
        assert_eq!(count(&code, TapeOp::Trigger), 1);
    }

    #[test]
    fn test_symbol_round_trip() {
        let ops = [
            TapeOp::Forward,
            TapeOp::Back,
            TapeOp::Inc,
            TapeOp::Dec,
            TapeOp::LoopOpen,
            TapeOp::LoopClose,
            TapeOp::Trigger,
        ];
        let text: String = ops.iter().map(|op| op.to_string()).collect();
        assert_eq!(text, "><+-[]%");
        for op in ops {
            assert_eq!(TapeOp::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(TapeOp::from_symbol('\n'), None);
    }
}
