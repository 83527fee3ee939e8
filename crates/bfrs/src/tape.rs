//! Sparse, auto-growing cell tape.
//!
//! Storage is a single growable `Vec<i64>` with a `base_offset` such that
//! `logical_index = physical_index - base_offset`. Growth is split into two
//! paths rather than the single signed-offset trick `profilebf.c`'s
//! `alloc_ptr` uses: `grow_right` extends in place, `grow_left` shifts
//! contents and bumps `base_offset`.

use crate::config::{MIN_ALLOC, TAPE_UNDERFLOW_LIMIT};
use crate::error::{BfError, BfFullError, BfResult};

pub struct Tape {
    cells: Vec<i64>,
    /// `cells[i]` holds logical index `i as i64 - base_offset`.
    base_offset: i64,
    /// Current logical data pointer.
    pointer: i64,
    pub tape_min: i64,
    pub tape_max: i64,
}

impl Tape {
    pub fn new() -> Self {
        Tape {
            cells: vec![0; MIN_ALLOC],
            base_offset: 0,
            pointer: 0,
            tape_min: 0,
            tape_max: 0,
        }
    }

    #[inline]
    fn physical(&self, logical: i64) -> i64 {
        logical + self.base_offset
    }

    fn grow_right(&mut self, want_logical: i64) -> BfResult<()> {
        let want_physical = self.physical(want_logical);
        if want_physical < self.cells.len() as i64 {
            return Ok(());
        }
        let deficit = want_physical - self.cells.len() as i64 + 1;
        let amount = ((deficit as usize) / MIN_ALLOC + 1) * MIN_ALLOC;
        self.cells
            .try_reserve(amount)
            .map_err(|_| BfFullError::new(BfError::AllocFailure, "memory allocation failure"))?;
        self.cells.resize(self.cells.len() + amount, 0);
        Ok(())
    }

    fn grow_left(&mut self, want_logical: i64) -> BfResult<()> {
        let want_physical = self.physical(want_logical);
        if want_physical >= 0 {
            return Ok(());
        }
        let deficit = (-want_physical) as usize;
        let amount = (deficit / MIN_ALLOC + 1) * MIN_ALLOC;
        let mut grown = Vec::new();
        grown
            .try_reserve(self.cells.len() + amount)
            .map_err(|_| BfFullError::new(BfError::AllocFailure, "memory allocation failure"))?;
        grown.resize(amount, 0);
        grown.extend_from_slice(&self.cells);
        self.cells = grown;
        self.base_offset += amount as i64;
        Ok(())
    }

    /// Move the pointer by `delta`, growing storage as needed. Fatal if the
    /// logical pointer falls past `TAPE_UNDERFLOW_LIMIT`.
    pub fn move_pointer(&mut self, delta: i64) -> BfResult<()> {
        self.pointer += delta;
        if delta > 0 {
            self.grow_right(self.pointer)?;
            if self.tape_max < self.pointer {
                self.tape_max = self.pointer;
            }
        } else if delta < 0 {
            self.grow_left(self.pointer)?;
            if self.tape_min > self.pointer {
                self.tape_min = self.pointer;
                if self.tape_min < TAPE_UNDERFLOW_LIMIT {
                    return Err(BfFullError::new(
                        BfError::TapeUnderflow,
                        format!("Tape underflow at pointer {}", self.tape_min),
                    ));
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn pointer(&self) -> i64 {
        self.pointer
    }

    /// Read/write the cell at `pointer + offset`, growing storage first.
    pub fn get_at(&mut self, offset: i64) -> BfResult<i64> {
        let logical = self.pointer + offset;
        if offset > 0 {
            self.grow_right(logical)?;
        } else if offset < 0 {
            self.grow_left(logical)?;
        }
        Ok(self.cells[self.physical(logical) as usize])
    }

    pub fn set_at(&mut self, offset: i64, value: i64) -> BfResult<()> {
        let logical = self.pointer + offset;
        if offset > 0 {
            self.grow_right(logical)?;
        } else if offset < 0 {
            self.grow_left(logical)?;
        }
        let idx = self.physical(logical) as usize;
        self.cells[idx] = value;
        Ok(())
    }

    #[inline]
    pub fn get(&mut self) -> BfResult<i64> {
        self.get_at(0)
    }

    #[inline]
    pub fn set(&mut self, value: i64) -> BfResult<()> {
        self.set_at(0, value)
    }

    /// Cell contents for logical indices `tape_min..=tape_max`, in order.
    pub fn visited_range(&self) -> Vec<i64> {
        if self.tape_max < self.tape_min {
            return Vec::new();
        }
        (self.tape_min..=self.tape_max)
            .map(|logical| self.cells[self.physical(logical) as usize])
            .collect()
    }
}

impl Default for Tape {
    fn default() -> Self {
        Tape::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_right_and_tracks_max() {
        let mut t = Tape::new();
        t.move_pointer(2000).unwrap();
        assert_eq!(t.tape_max, 2000);
        t.set(42).unwrap();
        assert_eq!(t.get().unwrap(), 42);
    }

    #[test]
    fn grows_left_and_tracks_min() {
        let mut t = Tape::new();
        t.move_pointer(-500).unwrap();
        assert_eq!(t.tape_min, -500);
        t.set(7).unwrap();
        assert_eq!(t.get().unwrap(), 7);
        // Moving back to zero must still see the original cell at 0.
        t.move_pointer(500).unwrap();
        assert_eq!(t.get().unwrap(), 0);
    }

    #[test]
    fn underflow_past_1000_is_fatal() {
        let mut t = Tape::new();
        let mut err = None;
        for _ in 0..1001 {
            if let Err(e) = t.move_pointer(-1) {
                err = Some(e);
                break;
            }
        }
        let e = err.expect("expected fatal underflow");
        assert_eq!(e.kind(), BfError::TapeUnderflow);
        assert!(e.message().contains("-1001"));
    }
}
