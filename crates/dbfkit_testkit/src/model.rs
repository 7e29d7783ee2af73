//! Reference model of GOTO navigation in natural order.
//!
//! Positions are ordinals: `-1` before the first record, `len` past the last.
//! Moves that leave the table land on the nearer boundary.

use dbfkit_core::GotoTarget;

/// Expected navigation behavior over a table with the given deleted flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationModel {
    deleted: Vec<bool>,
    skip_deleted: bool,
    ordinal: i64,
}

impl NavigationModel {
    /// A freshly opened table: on record 1, or at both boundaries if empty.
    pub fn new(deleted: Vec<bool>) -> Self {
        Self {
            deleted,
            skip_deleted: false,
            ordinal: 0,
        }
    }

    /// Sets deleted-record visibility.
    pub fn set_skip_deleted(&mut self, value: bool) {
        self.skip_deleted = value;
    }

    fn len(&self) -> i64 {
        self.deleted.len() as i64
    }

    fn at_boundary(&self) -> bool {
        self.ordinal < 0 || self.ordinal >= self.len()
    }

    fn land(&mut self, target: i64) {
        self.ordinal = target.clamp(-1, self.len());
    }

    /// Current record number, 0 at a boundary.
    pub fn recno(&self) -> u32 {
        if self.at_boundary() {
            0
        } else {
            (self.ordinal + 1) as u32
        }
    }

    /// Applies a move. `None` means the move is rejected and nothing changes.
    pub fn goto(&mut self, target: GotoTarget) -> Option<u32> {
        let step = match target {
            GotoTarget::Top => {
                self.land(0);
                1
            }
            GotoTarget::Bottom => {
                self.land(self.len() - 1);
                -1
            }
            GotoTarget::Next => {
                self.land(self.ordinal + 1);
                1
            }
            GotoTarget::Previous => {
                self.land(self.ordinal - 1);
                -1
            }
            GotoTarget::Skip(n) => {
                let n = if n == 0 { 1 } else { n };
                self.land(self.ordinal.saturating_add(n));
                n.signum()
            }
            GotoTarget::Record(recno) => {
                if recno == 0 || i64::from(recno) > self.len() {
                    return None;
                }
                self.ordinal = i64::from(recno) - 1;
                return Some(recno);
            }
        };
        if self.len() == 0 {
            return Some(0);
        }
        if self.skip_deleted {
            while !self.at_boundary() && self.deleted[self.ordinal as usize] {
                self.land(self.ordinal + step);
            }
        }
        Some(self.recno())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_and_clamps() {
        let mut model = NavigationModel::new(vec![false; 3]);
        assert_eq!(model.recno(), 1);
        assert_eq!(model.goto(GotoTarget::Skip(5)), Some(0));
        assert_eq!(model.goto(GotoTarget::Previous), Some(3));
        assert_eq!(model.goto(GotoTarget::Record(4)), None);
        assert_eq!(model.recno(), 3);
    }

    #[test]
    fn skips_hidden_records() {
        let mut model = NavigationModel::new(vec![true, false, true]);
        model.set_skip_deleted(true);
        assert_eq!(model.goto(GotoTarget::Top), Some(2));
        assert_eq!(model.goto(GotoTarget::Next), Some(0));
        assert_eq!(model.goto(GotoTarget::Record(3)), Some(3));
    }
}
