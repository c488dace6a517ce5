//! Debug symbols
//!
//! Sequence points live in a sidecar file next to the module (`.hwsym`), keyed
//! by declaring type and method key. When a method body is rewritten its
//! points must be remapped to the new instruction indices.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::module::ModuleError;
use std::path::{Path, PathBuf};

/// Magic number for symbol files: "HWSY"
pub const SYMBOLS_MAGIC: [u8; 4] = *b"HWSY";

/// File extension of symbol sidecars
pub const SYMBOLS_EXTENSION: &str = "hwsym";

/// Map from an instruction index to a source position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    /// Instruction index within the method body
    pub instruction: u32,
    /// Source line (1-based)
    pub line: u32,
    /// Source column (1-based)
    pub column: u32,
}

/// Sequence points of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSymbols {
    /// Declaring type full name
    pub type_name: String,
    /// Method key
    pub method_key: String,
    /// Index into [`DebugSymbols::source_files`]
    pub source_file_index: u32,
    /// Points sorted by instruction index
    pub points: Vec<SequencePoint>,
}

/// Debug symbols for a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugSymbols {
    /// Source file paths
    pub source_files: Vec<String>,
    /// Per-method sequence points
    pub methods: Vec<MethodSymbols>,
}

impl DebugSymbols {
    /// Create empty symbols
    pub fn new() -> Self {
        Self::default()
    }

    /// Sidecar path for a module path
    pub fn path_for(module_path: &Path) -> PathBuf {
        module_path.with_extension(SYMBOLS_EXTENSION)
    }

    /// Add a source file (deduplicated) and return its index
    pub fn add_source_file(&mut self, path: &str) -> u32 {
        if let Some(pos) = self.source_files.iter().position(|p| p == path) {
            return pos as u32;
        }
        self.source_files.push(path.to_string());
        (self.source_files.len() - 1) as u32
    }

    /// Symbols for a method
    pub fn find(&self, type_name: &str, method_key: &str) -> Option<&MethodSymbols> {
        self.methods
            .iter()
            .find(|m| m.type_name == type_name && m.method_key == method_key)
    }

    /// Mutable symbols for a method
    pub fn find_mut(&mut self, type_name: &str, method_key: &str) -> Option<&mut MethodSymbols> {
        self.methods
            .iter_mut()
            .find(|m| m.type_name == type_name && m.method_key == method_key)
    }

    /// Remap a method's points through `positions`, where `positions[i]` is the
    /// new index of original instruction `i`. Points past the map are dropped.
    pub fn remap(&mut self, type_name: &str, method_key: &str, positions: &[u32]) -> bool {
        let Some(method) = self.find_mut(type_name, method_key) else {
            return false;
        };
        method.points = method
            .points
            .iter()
            .filter_map(|p| {
                positions.get(p.instruction as usize).map(|&instruction| SequencePoint {
                    instruction,
                    ..*p
                })
            })
            .collect();
        true
    }

    /// Source position of an instruction: the last point at or before it
    pub fn lookup_location(
        &self,
        type_name: &str,
        method_key: &str,
        instruction: u32,
    ) -> Option<(&str, u32, u32)> {
        let method = self.find(type_name, method_key)?;
        let point = method
            .points
            .iter()
            .take_while(|p| p.instruction <= instruction)
            .last()?;
        let file = self.source_files.get(method.source_file_index as usize)?;
        Some((file.as_str(), point.line, point.column))
    }

    /// Encode to binary format
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&SYMBOLS_MAGIC);
        writer.emit_u32(self.source_files.len() as u32);
        for file in &self.source_files {
            writer.emit_string(file);
        }
        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            writer.emit_string(&method.type_name);
            writer.emit_string(&method.method_key);
            writer.emit_u32(method.source_file_index);
            writer.emit_u32(method.points.len() as u32);
            for point in &method.points {
                writer.emit_u32(point.instruction);
                writer.emit_u32(point.line);
                writer.emit_u32(point.column);
            }
        }
        writer.into_bytes()
    }

    /// Decode from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);
        let magic: [u8; 4] = reader.read_array()?;
        if magic != SYMBOLS_MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let mut symbols = Self::new();
        let file_count = reader.read_u32()? as usize;
        for _ in 0..file_count {
            symbols.source_files.push(reader.read_string()?);
        }
        let method_count = reader.read_u32()? as usize;
        for _ in 0..method_count {
            symbols.methods.push(decode_method(&mut reader)?);
        }
        Ok(symbols)
    }

    /// Read a sidecar file
    pub fn read_from(path: &Path) -> Result<Self, ModuleError> {
        let bytes = std::fs::read(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes)
    }
}

fn decode_method(reader: &mut BytecodeReader<'_>) -> Result<MethodSymbols, DecodeError> {
    let type_name = reader.read_string()?;
    let method_key = reader.read_string()?;
    let source_file_index = reader.read_u32()?;
    let point_count = reader.read_u32()? as usize;
    let mut points = Vec::new();
    for _ in 0..point_count {
        points.push(SequencePoint {
            instruction: reader.read_u32()?,
            line: reader.read_u32()?,
            column: reader.read_u32()?,
        });
    }
    Ok(MethodSymbols {
        type_name,
        method_key,
        source_file_index,
        points,
    })
}
