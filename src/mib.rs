//! The MIB store: an ordered, statically bounded table of OID-keyed data
//! cells. Producers build/update it; handlers only ever read it.

use crate::ber;
use crate::error::{AgentError, Result};
use crate::oid::Oid;

/// Hard bound on the number of MIB entries.
pub const MAX_VALUES: usize = 2048;

/// Declared scalar type of a MIB cell, used at build time to size the
/// cell's capacity for the worst case of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Integer,
    OctetString,
    Oid,
    Counter,
    Gauge,
    TimeTicks,
}

/// A fully BER-encoded value buffer, owned by the MIB store. Sized once
/// at build time; string cells may grow on update (reallocation), numeric
/// cells never exceed their declared worst case.
#[derive(Debug, Clone)]
pub struct Cell {
    ty: CellType,
    buffer: Vec<u8>,
}

impl Cell {
    fn with_capacity(ty: CellType, capacity: usize) -> Self {
        Cell {
            ty,
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn ty(&self) -> CellType {
        self.ty
    }

    fn set_integer(&mut self, val: i32) -> Result<()> {
        let mut tmp = vec![0u8; 6];
        let end = ber::encode_integer(&mut tmp, 0, val)?;
        tmp.truncate(end);
        self.buffer = tmp;
        Ok(())
    }

    fn set_unsigned(&mut self, ty: u8, val: u32) -> Result<()> {
        let mut tmp = vec![0u8; 7];
        let end = ber::encode_unsigned(&mut tmp, 0, ty, val)?;
        tmp.truncate(end);
        self.buffer = tmp;
        Ok(())
    }

    fn set_string(&mut self, s: &[u8]) -> Result<()> {
        let mut tmp = vec![0u8; s.len() + 5];
        let end = ber::encode_octet_string(&mut tmp, 0, s)?;
        tmp.truncate(end);
        self.buffer = tmp;
        Ok(())
    }

    fn set_oid(&mut self, oid: &Oid) -> Result<()> {
        let mut tmp = vec![0u8; oid.encoded_length() + 2];
        let end = ber::encode_oid(&mut tmp, 0, oid)?;
        tmp.truncate(end);
        self.buffer = tmp;
        Ok(())
    }
}

/// Value written into a cell via [`Mib::update`].
pub enum CellValue<'a> {
    Integer(i32),
    Counter(u32),
    Gauge(u32),
    TimeTicks(u32),
    String(&'a [u8]),
    Oid(&'a Oid),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub oid: Oid,
    pub cell: Cell,
}

/// Ordered sequence of MIB entries, strictly ascending by OID. Entries are
/// never deleted during the process lifetime; indices are stable from
/// `build()` through process exit.
#[derive(Debug, Default)]
pub struct Mib {
    entries: Vec<Entry>,
}

/// Worst-case cell capacity for each declared type: tag + length + up to
/// 4 content bytes for scalars, `MAX_SUBIDS*5 + 4` for OIDs. Strings start
/// small and grow on update.
fn worst_case_capacity(ty: CellType) -> usize {
    match ty {
        CellType::Integer | CellType::Counter | CellType::Gauge | CellType::TimeTicks => 6,
        CellType::Oid => crate::oid::MAX_SUBIDS * 5 + 4,
        CellType::OctetString => 16,
    }
}

impl Mib {
    pub fn new() -> Self {
        Mib {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> Option<&Entry> {
        self.entries.get(idx)
    }

    /// Appends a new entry with an empty cell of the given declared type.
    /// Callers (the builder) must insert in ascending OID order; this is
    /// checked with a debug assertion only rather than paying for a
    /// runtime check on every build in release.
    pub fn push_entry(&mut self, oid: Oid, ty: CellType) -> Result<usize> {
        if self.entries.len() >= MAX_VALUES {
            return Err(AgentError::TableOverflow(MAX_VALUES));
        }
        debug_assert!(
            self.entries
                .last()
                .map(|e| e.oid.compare(&oid) == std::cmp::Ordering::Less)
                .unwrap_or(true),
            "MIB entries must be inserted in strictly ascending OID order"
        );

        let cell = Cell::with_capacity(ty, worst_case_capacity(ty));
        let idx = self.entries.len();
        self.entries.push(Entry { oid, cell });
        Ok(idx)
    }

    /// Starting at `*cursor`, advances until an entry whose OID is a
    /// prefix of or equals `oid`; leaves `*cursor` at the match (or past
    /// the end). Used by the updater to walk entries in build order,
    /// amortising a full refresh to O(total entries).
    pub fn find(&self, oid: &Oid, cursor: &mut usize) -> Option<usize> {
        while *cursor < self.entries.len() {
            let candidate = &self.entries[*cursor].oid;
            if candidate.is_prefix_of(oid) || candidate == oid {
                return Some(*cursor);
            }
            *cursor += 1;
        }
        None
    }

    /// Lexicographic successor: the entry with strictly greater OID.
    /// Linear scan, acceptable at `MAX_VALUES` scale.
    pub fn find_next(&self, oid: &Oid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.oid.compare(oid) == std::cmp::Ordering::Greater)
    }

    /// Exact lookup: the entry whose OID is a prefix of or equal to `oid`,
    /// by linear scan. Used by `GET` where there is no maintained cursor.
    pub fn find_exact_or_prefix(&self, oid: &Oid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.oid.is_prefix_of(oid) || &e.oid == oid)
    }

    /// Re-encodes the value of the entry at `idx` into its existing cell.
    /// Fails if the cell's declared type's worst case is exceeded for
    /// fixed-size types (strings reallocate instead).
    pub fn update(&mut self, idx: usize, value: CellValue) -> Result<()> {
        let entry = self
            .entries
            .get_mut(idx)
            .ok_or(AgentError::MalformedPacket("update: index out of range"))?;

        match (entry.cell.ty, value) {
            (CellType::Integer, CellValue::Integer(v)) => entry.cell.set_integer(v),
            (CellType::Counter, CellValue::Counter(v)) => entry.cell.set_unsigned(ber::TYPE_COUNTER, v),
            (CellType::Gauge, CellValue::Gauge(v)) => entry.cell.set_unsigned(ber::TYPE_GAUGE, v),
            (CellType::TimeTicks, CellValue::TimeTicks(v)) => {
                entry.cell.set_unsigned(ber::TYPE_TIME_TICKS, v)
            }
            (CellType::OctetString, CellValue::String(s)) => entry.cell.set_string(s),
            (CellType::Oid, CellValue::Oid(o)) => entry.cell.set_oid(o),
            _ => Err(AgentError::MalformedPacket(
                "update: cell type / value mismatch",
            )),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        Oid::from_ascii(s).unwrap()
    }

    #[test]
    fn strictly_ascending_after_build() {
        let mut mib = Mib::new();
        mib.push_entry(oid(".1.3.6.1.2.1.1.1.0"), CellType::OctetString)
            .unwrap();
        mib.push_entry(oid(".1.3.6.1.2.1.1.2.0"), CellType::Oid)
            .unwrap();
        mib.push_entry(oid(".1.3.6.1.2.1.1.3.0"), CellType::TimeTicks)
            .unwrap();

        for w in 0..mib.len() - 1 {
            let a = &mib.entry(w).unwrap().oid;
            let b = &mib.entry(w + 1).unwrap().oid;
            assert_eq!(a.compare(b), std::cmp::Ordering::Less);
        }
    }

    #[test]
    fn find_next_strictly_greater_and_none_past_end() {
        let mut mib = Mib::new();
        mib.push_entry(oid(".1.3.6.1.2.1.1.1.0"), CellType::OctetString)
            .unwrap();
        mib.push_entry(oid(".1.3.6.1.2.1.1.2.0"), CellType::Oid)
            .unwrap();

        let next = mib.find_next(&oid(".1.3.6.1.2.1.1.1.0")).unwrap();
        assert_eq!(mib.entry(next).unwrap().oid, oid(".1.3.6.1.2.1.1.2.0"));

        assert!(mib.find_next(&oid(".1.3.6.1.2.1.1.2.0")).is_none());
        assert!(mib.find_next(&oid(".1.3.6.1.2.1.1.99.0")).is_none());
    }

    #[test]
    fn update_rejects_type_mismatch() {
        let mut mib = Mib::new();
        let idx = mib
            .push_entry(oid(".1.3.6.1.2.1.1.3.0"), CellType::TimeTicks)
            .unwrap();
        assert!(mib.update(idx, CellValue::Integer(5)).is_err());
        assert!(mib.update(idx, CellValue::TimeTicks(500)).is_ok());
    }

    #[test]
    fn table_overflow_reported() {
        let mut mib = Mib::new();
        // push entries with distinct last subid to stay ascending
        for i in 0..MAX_VALUES {
            let o = Oid::new(vec![1, 3, 6, 1, i as u32 + 1]).unwrap();
            mib.push_entry(o, CellType::Integer).unwrap();
        }
        let overflow_oid = Oid::new(vec![1, 3, 6, 1, MAX_VALUES as u32 + 1]).unwrap();
        assert!(matches!(
            mib.push_entry(overflow_oid, CellType::Integer),
            Err(AgentError::TableOverflow(_))
        ));
    }
}
