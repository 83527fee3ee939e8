//! Run configuration: cell width, EOF policy, and the small set of flags
//! that change interpreter/JIT behavior. Kept as plain `Copy` structs the
//! way `compiler::parser::TokensizeConfig` threads lexer configuration
//! through without any builder ceremony.

/// Supported cell widths. `SAFE_CELL_MAX` in the interpreter assumes the
/// host integer (`i64`) is always wide enough to hold any of these without
/// wrapping; see DESIGN.md for the reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellWidth {
    Unsigned7,
    Unsigned8,
    Signed8,
    Unsigned12,
    Unsigned16,
}

/// Physical bounds and masking width for a cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellConfig {
    pub cell_mask: i64,
    pub physical_min: i64,
    pub physical_max: i64,
}

impl CellConfig {
    pub fn from_width(width: CellWidth) -> Self {
        match width {
            CellWidth::Unsigned8 => CellConfig {
                cell_mask: 0xFF,
                physical_min: 0,
                physical_max: 0xFF,
            },
            CellWidth::Signed8 => {
                let mask = 0xFF;
                let max = mask >> 1;
                CellConfig {
                    cell_mask: mask,
                    physical_min: -1 - max,
                    physical_max: max,
                }
            }
            CellWidth::Unsigned16 => CellConfig {
                cell_mask: (1 << 16) - 1,
                physical_min: 0,
                physical_max: (1 << 16) - 1,
            },
            CellWidth::Unsigned12 => CellConfig {
                cell_mask: (1 << 12) - 1,
                physical_min: 0,
                physical_max: (1 << 12) - 1,
            },
            CellWidth::Unsigned7 => CellConfig {
                cell_mask: (1 << 7) - 1,
                physical_min: 0,
                physical_max: (1 << 7) - 1,
            },
        }
    }

    pub fn bits(&self) -> u32 {
        64 - (self.cell_mask.leading_zeros())
    }
}

impl Default for CellConfig {
    fn default() -> Self {
        CellConfig::from_width(CellWidth::Unsigned8)
    }
}

/// How `,` behaves once stdin hits EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofPolicy {
    MinusOne,
    Zero,
    Unchanged,
}

impl Default for EofPolicy {
    fn default() -> Self {
        EofPolicy::Unchanged
    }
}

/// Safety bound for logical-overflow mode: even a wide host integer is
/// reduced back into range once it crosses this, so the accounting arrays
/// never see a value that could itself overflow while being tallied.
pub const SAFE_CELL_MAX: i64 = (1 << 30) - 1;

/// Run-length fold cap for `+`/`-` tokens (not for `>`/`<`). Keeps
/// multiply-loop factors representable in a small signed counter during
/// optimization; named here instead of left as a magic literal.
pub const ADD_SUB_FOLD_CAP: u32 = 128;

/// Tape grows in blocks of this many cells on either side.
pub const MIN_ALLOC: usize = 1024;

/// Tape underflow past this logical index is fatal.
pub const TAPE_UNDERFLOW_LIMIT: i64 = -1000;

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub cell: CellConfig,
    pub eof: EofPolicy,
    pub physical_overflow: bool,
    pub debug_hash: bool,
    pub suppress_io: bool,
    pub all_cells: bool,
    pub optimize: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            cell: CellConfig::default(),
            eof: EofPolicy::default(),
            physical_overflow: false,
            debug_hash: false,
            suppress_io: false,
            all_cells: false,
            optimize: true,
        }
    }
}
