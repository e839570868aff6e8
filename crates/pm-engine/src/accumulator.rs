//! Running sums filled during a scan.

use serde::Serialize;

/// Weighted and raw counts of one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Cell {
    pub sumw: f64,
    pub sumw2: f64,
    pub entries: u64,
}

impl Cell {
    #[inline]
    pub fn add(&mut self, w: f64) {
        self.sumw += w;
        self.sumw2 += w * w;
        self.entries += 1;
    }

    #[inline]
    pub fn merge(&mut self, other: &Cell) {
        self.sumw += other.sumw;
        self.sumw2 += other.sumw2;
        self.entries += other.entries;
    }

    /// Statistical uncertainty, `sqrt(sum w^2)`.
    pub fn error(&self) -> f64 {
        self.sumw2.sqrt()
    }
}

/// Per category slot, per cell sums of one plot request.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    n_cells: usize,
    slots: Vec<Vec<Cell>>,
}

impl Accumulator {
    pub fn new(n_slots: usize, n_cells: usize) -> Self {
        Self { n_cells, slots: vec![vec![Cell::default(); n_cells]; n_slots] }
    }

    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn slot(&self, slot: usize) -> &[Cell] {
        &self.slots[slot]
    }

    pub fn slot_mut(&mut self, slot: usize) -> &mut [Cell] {
        &mut self.slots[slot]
    }

    /// Add `other` cell by cell. Shapes must agree.
    pub fn merge(&mut self, other: &Accumulator) {
        debug_assert_eq!(self.n_cells, other.n_cells);
        debug_assert_eq!(self.slots.len(), other.slots.len());
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                a.merge(b);
            }
        }
    }

    /// Zero every cell.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.fill(Cell::default());
        }
    }

    /// Raw entries over all slots and cells.
    pub fn total_entries(&self) -> u64 {
        self.slots.iter().flatten().map(|c| c.entries).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_cellwise() {
        let mut a = Accumulator::new(2, 3);
        let mut b = Accumulator::new(2, 3);
        a.slot_mut(0)[1].add(2.0);
        b.slot_mut(0)[1].add(3.0);
        b.slot_mut(1)[2].add(1.0);
        a.merge(&b);
        assert_eq!(a.slot(0)[1], Cell { sumw: 5.0, sumw2: 13.0, entries: 2 });
        assert_eq!(a.slot(1)[2].entries, 1);
        assert_eq!(a.total_entries(), 3);
        a.reset();
        assert_eq!(a.total_entries(), 0);
    }
}
