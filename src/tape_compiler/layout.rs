// Tape Layout Planning
//
// Assigns every string, pointer table and the syscall frame a fixed, disjoint
// range of tape offsets before any code is emitted. Nothing grows afterwards:
// the generator cannot read the tape back, so every address baked into the
// program has to be known up front.

use crate::config::LayoutConfig;
use crate::exec_request::ExecRequest;
use crate::tape_compiler::error::CompilerError;
use crate::tape_compiler::frame::SyscallFrame;
use indexmap::IndexMap;
use log::{debug, warn};
use std::fmt;
use std::ops::Range;

/// The syscall frame is read by the trigger at the head, which returns here
pub const FRAME_BASE: usize = 0;

/// Width of a native pointer in the argv/envp tables
pub const POINTER_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Strings,
    ArgvTable,
    EnvTable,
    Frame,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegionKind::Strings => write!(f, "string table"),
            RegionKind::ArgvTable => write!(f, "argv table"),
            RegionKind::EnvTable => write!(f, "envp table"),
            RegionKind::Frame => write!(f, "syscall frame"),
        }
    }
}

/// Handle to a string placed in a StringTable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry {
    pub offset: usize,
    pub content: Vec<u8>,
}

impl StringEntry {
    /// Content plus the zero terminator, as written to the tape
    pub fn terminated(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.content.len() + 1);
        bytes.extend_from_slice(&self.content);
        bytes.push(0);
        bytes
    }

    pub fn end(&self) -> usize {
        self.offset + self.content.len() + 1
    }
}

/// Zero-terminated strings packed back to back in insertion order
#[derive(Debug, Clone)]
pub struct StringTable {
    base: usize,
    entries: Vec<StringEntry>,
}

impl StringTable {
    pub fn new(base: usize) -> Self {
        StringTable {
            base,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, content: impl AsRef<[u8]>) -> StrId {
        let content = content.as_ref().to_vec();
        if content.contains(&0) {
            // Written verbatim; the engine will see the string end early
            warn!(
                "String {:?} contains an interior zero byte",
                String::from_utf8_lossy(&content)
            );
        }

        let offset = self.end();
        self.entries.push(StringEntry { offset, content });
        StrId(self.entries.len() - 1)
    }

    pub fn offset(&self, id: StrId) -> usize {
        self.entries[id.0].offset
    }

    pub fn get(&self, id: StrId) -> &StringEntry {
        &self.entries[id.0]
    }

    pub fn entries(&self) -> &[StringEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First offset past the last terminator
    pub fn end(&self) -> usize {
        self.entries.last().map_or(self.base, |e| e.end())
    }

    pub fn range(&self) -> Range<usize> {
        self.base..self.end()
    }
}

/// Null-terminated table of absolute pointers into the StringTable
#[derive(Debug, Clone)]
pub struct PointerTable {
    base: usize,
    entries: Vec<StrId>,
}

impl PointerTable {
    pub fn new(base: usize, entries: Vec<StrId>) -> Self {
        PointerTable { base, entries }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn entries(&self) -> &[StrId] {
        &self.entries
    }

    /// Entries plus the null terminator
    pub fn byte_len(&self) -> usize {
        (self.entries.len() + 1) * POINTER_WIDTH
    }

    pub fn range(&self) -> Range<usize> {
        self.base..self.base + self.byte_len()
    }

    /// Little-endian native pointers, `tape_base + offset` per entry, then null.
    /// Address overflow wraps silently.
    pub fn encode(&self, tape_base: u64, strings: &StringTable) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for &id in &self.entries {
            let address = tape_base.wrapping_add(strings.offset(id) as u64);
            bytes.extend_from_slice(&address.to_le_bytes());
        }
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes
    }
}

/// Decode little-endian pointers up to (not including) the first null entry
pub fn decode_pointers(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(POINTER_WIDTH)
        .map(|chunk| {
            let mut word = [0u8; POINTER_WIDTH];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .take_while(|&pointer| pointer != 0)
        .collect()
}

/// Every region the generated program writes, with fixed offsets
#[derive(Debug, Clone)]
pub struct TapeLayout {
    pub strings: StringTable,
    pub path: StrId,
    pub argv: PointerTable,
    pub envp: PointerTable,
    pub frame: SyscallFrame,
    regions: IndexMap<RegionKind, Range<usize>>,
}

impl TapeLayout {
    /// Place an execve request on the tape.
    ///
    /// Strings go in the order pathname, argv, envp so that the pathname is
    /// the first entry of the string table.
    pub fn plan(config: &LayoutConfig, request: &ExecRequest) -> Result<TapeLayout, CompilerError> {
        let mut strings = StringTable::new(config.strings_base);

        let path = strings.push(&request.path);
        let argv_ids: Vec<StrId> = request.argv.iter().map(|arg| strings.push(arg)).collect();
        let env_ids: Vec<StrId> = request.envp.iter().map(|var| strings.push(var)).collect();

        let argv = PointerTable::new(config.argv_base, argv_ids);
        let envp = PointerTable::new(config.env_base, env_ids);

        let frame = SyscallFrame::execve(
            descriptor_offset(RegionKind::Strings, strings.offset(path))?,
            descriptor_offset(RegionKind::ArgvTable, argv.base())?,
            descriptor_offset(RegionKind::EnvTable, envp.base())?,
        );

        // Insertion order is emission order
        let mut regions = IndexMap::new();
        regions.insert(RegionKind::Strings, strings.range());
        regions.insert(RegionKind::ArgvTable, argv.range());
        regions.insert(RegionKind::EnvTable, envp.range());
        regions.insert(
            RegionKind::Frame,
            FRAME_BASE..FRAME_BASE + frame.encoded_len(),
        );

        let layout = TapeLayout {
            strings,
            path,
            argv,
            envp,
            frame,
            regions,
        };
        layout.check_disjoint()?;
        Ok(layout)
    }

    pub fn regions(&self) -> &IndexMap<RegionKind, Range<usize>> {
        &self.regions
    }

    pub fn region(&self, kind: RegionKind) -> Range<usize> {
        self.regions[&kind].clone()
    }

    pub fn log_regions(&self) {
        for (kind, range) in &self.regions {
            debug!(
                "📐 {:<14} [{:>5}..{:>5}) {} bytes",
                kind.to_string(),
                range.start,
                range.end,
                range.len()
            );
        }
        for entry in self.strings.entries() {
            debug!(
                "  ├─ {:>5}: {:?}",
                entry.offset,
                String::from_utf8_lossy(&entry.content)
            );
        }
    }

    fn check_disjoint(&self) -> Result<(), CompilerError> {
        let regions: Vec<(&RegionKind, &Range<usize>)> = self.regions.iter().collect();
        for (i, (kind_a, range_a)) in regions.iter().enumerate() {
            for (kind_b, range_b) in &regions[i + 1..] {
                if range_a.is_empty() || range_b.is_empty() {
                    continue;
                }
                if range_a.start < range_b.end && range_b.start < range_a.end {
                    return Err(CompilerError::RegionOverlap(
                        **kind_a,
                        (*range_a).clone(),
                        **kind_b,
                        (*range_b).clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn descriptor_offset(region: RegionKind, offset: usize) -> Result<u16, CompilerError> {
    u16::try_from(offset).map_err(|_| CompilerError::OffsetOutOfRange(region, offset))
}
