//! 3270 field model
//!
//! A field is a contiguous run of buffer cells that begins with its
//! attribute byte. The attribute byte is stored as `data[0]`; the cells that
//! follow are the field's contents in host (EBCDIC) encoding.

use super::codes::{ATTR_MDT, ATTR_NUMERIC, ATTR_PROTECTED};

/// A field on the 3270 screen
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Attribute byte followed by cell bytes
    data: Vec<u8>,

    /// Contents as they were before the last committing write
    snapshot: Option<Vec<u8>>,

    protected: bool,
    numeric: bool,
    modified: bool,

    /// Buffer address of the attribute byte
    pub address_start: u16,

    /// Exclusive end address, wraps past the end of the buffer
    pub address_end: u16,

    /// Write cycle that created this field
    pub generation: u32,
}

impl Field {
    /// Create a field from an attribute byte plus optional initial cells
    ///
    /// An empty `data` gets a null attribute byte; a field always spans at
    /// least one cell.
    pub fn new(mut data: Vec<u8>) -> Self {
        if data.is_empty() {
            data.push(0x00);
        }
        let mut field = Self {
            data,
            snapshot: None,
            protected: false,
            numeric: false,
            modified: false,
            address_start: 0,
            address_end: 0,
            generation: 0,
        };
        if let Some(&attribute) = field.data.first() {
            field.apply_attributes(attribute);
        }
        field
    }

    /// Field with only an attribute byte
    pub fn with_attribute(attribute: u8) -> Self {
        Self::new(vec![attribute])
    }

    /// Re-derive flags from an attribute byte; a zero byte leaves them untouched
    pub fn apply_attributes(&mut self, attribute: u8) {
        if attribute == 0 {
            return;
        }
        self.protected = attribute & ATTR_PROTECTED != 0;
        self.numeric = attribute & ATTR_NUMERIC != 0;
        self.modified = attribute & ATTR_MDT != 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cell bytes without the attribute byte
    pub fn cells(&self) -> &[u8] {
        self.data.get(1..).unwrap_or(&[])
    }

    pub fn attribute(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Number of buffer cells the field occupies, attribute included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Protected and numeric together mark an autoskip field
    pub fn skip(&self) -> bool {
        self.protected && self.numeric
    }

    /// Zero-width autoskip marker left behind by field boundaries
    pub fn is_useless(&self) -> bool {
        self.skip() && self.data.len() <= 1
    }

    pub fn snapshot(&self) -> Option<&[u8]> {
        self.snapshot.as_deref()
    }

    /// Append cells, re-deriving flags from the attribute byte
    pub fn append_data(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        if let Some(&attribute) = self.data.first() {
            self.apply_attributes(attribute);
        }
    }

    /// Grow with nulls or shrink so the field occupies exactly `len` cells
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len.max(1), 0x00);
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
        if let Some(attribute) = self.data.first_mut() {
            *attribute |= ATTR_MDT;
        }
    }

    pub fn mark_unmodified(&mut self) {
        self.modified = false;
        if let Some(attribute) = self.data.first_mut() {
            *attribute &= !ATTR_MDT;
        }
    }

    /// Splice `bytes` in at `offset`, keeping a snapshot of the previous contents
    ///
    /// Offset 0 overwrites the attribute byte, which re-derives the flags.
    pub fn update_data(&mut self, bytes: &[u8], offset: usize) {
        self.snapshot = Some(self.data.clone());

        if self.data.len() < offset {
            self.data.resize(offset, 0x00);
        }
        let end = (offset + bytes.len()).min(self.data.len());
        self.data.splice(offset..end, bytes.iter().copied());

        self.mark_modified();
        if offset == 0 {
            if let Some(&attribute) = self.data.first() {
                self.apply_attributes(attribute);
            }
        }
    }

    /// Restore the snapshot taken by the last `update_data` and clear the MDT
    ///
    /// The snapshot is consumed; a second reset only clears the MDT.
    pub fn reset_data(&mut self) {
        if let Some(previous) = self.snapshot.take() {
            self.data = previous;
            if let Some(&attribute) = self.data.first() {
                self.apply_attributes(attribute);
            }
        }
        self.mark_unmodified();
    }

    /// Null every cell, dropping the snapshot and the MDT
    pub fn clear_cells(&mut self) {
        for cell in self.data.iter_mut().skip(1) {
            *cell = 0x00;
        }
        self.snapshot = None;
        self.mark_unmodified();
    }
}
