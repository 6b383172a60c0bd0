//! 3270 screen buffer
//!
//! The screen is an ordered list of [`Field`]s laid over a circular buffer
//! of `rows * cols` cells, plus two independent positions: the buffer
//! address where host orders write, and the cursor address where operator
//! input lands.

use std::fmt;
use std::sync::Arc;

use super::address::{decode_address, encode_address, TerminalModel};
use super::codes::{ORDER_SBA, ORDER_SF};
use super::field::Field;
use crate::error::WriteError;
use crate::protocol_common::ebcdic::CodePageTranslator;

/// Field list, buffer/cursor addresses and write-cycle generation
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    model: TerminalModel,
    translator: Arc<dyn CodePageTranslator>,
    fields: Vec<Field>,
    buffer_address: u16,
    cursor_address: u16,
    generation: u32,
}

impl ScreenBuffer {
    pub fn new(model: TerminalModel, translator: Arc<dyn CodePageTranslator>) -> Self {
        Self {
            model,
            translator,
            fields: Vec::new(),
            buffer_address: 0,
            cursor_address: 0,
            generation: 0,
        }
    }

    pub fn model(&self) -> TerminalModel {
        self.model
    }

    pub fn rows(&self) -> usize {
        self.model.rows()
    }

    pub fn cols(&self) -> usize {
        self.model.cols()
    }

    pub fn size(&self) -> usize {
        self.model.buffer_size()
    }

    pub fn translator(&self) -> &Arc<dyn CodePageTranslator> {
        &self.translator
    }

    pub fn set_translator(&mut self, translator: Arc<dyn CodePageTranslator>) {
        self.translator = translator;
    }

    pub fn buffer_address(&self) -> u16 {
        self.buffer_address
    }

    pub fn cursor_address(&self) -> u16 {
        self.cursor_address
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set_buffer_address(&mut self, address: u16) {
        self.buffer_address = self.model.add_to_address(0, address);
    }

    pub fn set_cursor_address(&mut self, address: u16) {
        self.cursor_address = self.model.add_to_address(0, address);
    }

    /// Cursor position as (row, col)
    pub fn cursor_position(&self) -> (usize, usize) {
        self.model.address_to_row_col(self.cursor_address)
    }

    pub fn add_to_address(&self, amount: i32, address: u16) -> u16 {
        self.model.add_to_address(amount, address)
    }

    pub fn subtract_from_address(&self, amount: i32, address: u16) -> u16 {
        self.model.subtract_from_address(amount, address)
    }

    pub fn distance(&self, from: u16, to: u16) -> usize {
        self.model.distance(from, to)
    }

    pub fn encode_address(&self, address: u16) -> [u8; 2] {
        encode_address(address)
    }

    pub fn decode_address(&self, byte1: u8, byte2: u8) -> u16 {
        self.model.add_to_address(0, decode_address(byte1, byte2))
    }

    pub fn row_col_to_address(&self, row: usize, col: usize) -> u16 {
        self.model.row_col_to_address(row, col)
    }

    pub fn address_to_row_col(&self, address: u16) -> (usize, usize) {
        self.model.address_to_row_col(address)
    }

    /// Start a new write cycle; fields added from now on carry the new tag
    pub fn new_screen(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// All fields in address order, including earlier generations
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields created by the current write cycle
    pub fn current_fields(&self) -> impl Iterator<Item = &Field> {
        let generation = self.generation;
        self.fields.iter().filter(move |f| f.generation == generation)
    }

    /// Place a field at the buffer address, keeping the list in address order
    ///
    /// A useless field directly before the buffer address is dropped first and
    /// the buffer address moves one cell on. A field already starting there is
    /// replaced, fields the new one runs over are merged into it, and a field
    /// whose run contains the start is cut there. The field before it in
    /// address order is padded with nulls to end where the new one starts, and
    /// the new one is padded up to the next field when it lands between two.
    pub fn add_field(&mut self, mut field: Field) {
        if let Some(index) = self.index_before(self.buffer_address) {
            if self.fields[index].is_useless() {
                let dropped = self.fields.remove(index);
                log::debug!("dropping useless field at {}", dropped.address_start);
                self.buffer_address = self.model.add_to_address(1, self.buffer_address);
            }
        }

        let start = self.buffer_address;
        let written = field.len();
        field.address_start = start;
        field.generation = self.generation;

        if let Some(index) = self.fields.iter().position(|f| f.address_start == start) {
            let replaced = self.fields.remove(index);
            log::debug!("field at {} replaced (generation {})", start, replaced.generation);
        }

        while let Some(index) = self
            .fields
            .iter()
            .position(|f| self.model.distance(start, f.address_start) < field.len())
        {
            let covered = self.fields.remove(index);
            let overlap = field.len() - self.model.distance(start, covered.address_start);
            if let Some(tail) = covered.data().get(overlap..) {
                field.append_data(tail);
            }
        }

        for existing in &mut self.fields {
            let offset = self.model.distance(existing.address_start, start);
            if offset < existing.len() {
                existing.resize(offset);
                existing.address_end = start;
            }
        }

        let index = self.fields.partition_point(|f| f.address_start < start);
        if let Some(previous) = index.checked_sub(1).map(|i| &mut self.fields[i]) {
            let span = usize::from(start - previous.address_start);
            if span != previous.len() {
                previous.resize(span);
                previous.address_end = start;
            }
        }
        if let Some(next) = self.fields.get(index) {
            let gap = usize::from(next.address_start - start);
            if field.len() < gap {
                field.resize(gap);
            }
        }

        field.address_end = self.model.add_to_address(field.len() as i32, start);
        self.buffer_address = self.model.add_to_address(written as i32, start);
        self.fields.insert(index, field);
    }

    // Last field starting before `address` in address order
    fn index_before(&self, address: u16) -> Option<usize> {
        self.fields
            .partition_point(|f| f.address_start < address)
            .checked_sub(1)
    }

    /// Remove the field the buffer address follows, for orders that rebuild it
    ///
    /// Falls back to the last field when none starts before `address`.
    pub fn take_field_before(&mut self, address: u16) -> Option<Field> {
        let index = self
            .index_before(address)
            .or_else(|| self.fields.len().checked_sub(1))?;
        Some(self.fields.remove(index))
    }

    pub fn remove_field(&mut self, index: usize) -> Option<Field> {
        if index < self.fields.len() {
            Some(self.fields.remove(index))
        } else {
            None
        }
    }

    /// Drop useless fields from the end of the list
    pub fn strip_useless_fields(&mut self) {
        while self.fields.last().is_some_and(Field::is_useless) {
            self.fields.pop();
        }
    }

    fn field_contains(&self, field: &Field, address: u16) -> bool {
        self.model.distance(field.address_start, address) < field.len()
    }

    fn field_index_at(&self, address: u16) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| self.field_contains(field, address))
    }

    /// Field whose run covers `address`
    pub fn find_field(&self, address: u16) -> Option<&Field> {
        self.field_index_at(address).map(|index| &self.fields[index])
    }

    /// First field whose cells contain `text`
    pub fn find_text(&self, text: &str) -> Option<&Field> {
        let needle = self.translator.to_ebcdic(text);
        if needle.is_empty() {
            return None;
        }
        self.fields
            .iter()
            .find(|field| field.cells().windows(needle.len()).any(|w| w == needle.as_slice()))
    }

    /// Decoded cell text of a field, nulls removed
    pub fn field_text(&self, field: &Field) -> String {
        let cells: Vec<u8> = field.cells().iter().copied().filter(|&b| b != 0x00).collect();
        self.translator.from_ebcdic(&cells)
    }

    /// Remove every field and home both addresses
    pub fn erase_all(&mut self) {
        self.fields.clear();
        self.buffer_address = 0;
        self.cursor_address = 0;
    }

    /// Null all unprotected cells and put the cursor on the first one
    pub fn erase_all_unprotected(&mut self) {
        let mut first_input = None;
        for field in self.fields.iter_mut().filter(|f| !f.is_protected()) {
            field.clear_cells();
            if first_input.is_none() && field.len() > 1 {
                first_input = Some(field.address_start);
            }
        }
        self.cursor_address = match first_input {
            Some(start) => self.model.add_to_address(1, start),
            None => 0,
        };
    }

    /// Revert operator changes to unprotected fields and clear their MDT
    pub fn reset_modified(&mut self) {
        for field in self
            .fields
            .iter_mut()
            .filter(|f| !f.is_protected() && f.is_modified())
        {
            field.reset_data();
        }
    }

    /// Type `text` at the cursor, or at (row, col) when given
    ///
    /// Protected+numeric (autoskip) fields are skipped forward. The write is
    /// rejected, leaving the screen and cursor untouched, when the target is
    /// protected, sits on an attribute byte, or lacks room for the text.
    pub fn write_string(&mut self, text: &str, position: Option<(usize, usize)>) -> Result<(), WriteError> {
        let previous = self.cursor_address;
        if let Some((row, col)) = position {
            self.cursor_address = self.model.row_col_to_address(row, col);
        }

        let result = self.try_write(text);
        if let Err(err) = &result {
            log::warn!("write_string rejected: {}", err);
            self.cursor_address = previous;
        }
        result
    }

    fn try_write(&mut self, text: &str) -> Result<(), WriteError> {
        let mut address = self.cursor_address;
        let mut index = self
            .field_index_at(address)
            .ok_or(WriteError::NoField { address })?;

        while self.fields[index].skip() {
            index += 1;
            let next = self.fields.get(index).ok_or(WriteError::NoField { address })?;
            address = self.model.add_to_address(1, next.address_start);
        }

        let field = &self.fields[index];
        if field.is_protected() {
            return Err(WriteError::ProtectedField { address });
        }
        let offset = self.model.distance(field.address_start, address);
        if offset == 0 {
            return Err(WriteError::AttributePosition { address });
        }

        let bytes = self.translator.to_ebcdic(text);
        let available = field.len().saturating_sub(offset);
        if available < bytes.len() {
            return Err(WriteError::InsufficientRoom {
                address,
                needed: bytes.len(),
                available,
            });
        }

        self.fields[index].update_data(&bytes, offset);
        self.cursor_address = self
            .model
            .add_to_address(text.chars().count() as i32, address);
        Ok(())
    }

    /// Read Buffer payload: every current field as `SBA addr SF attr cells`
    pub fn read_buffer(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in self.current_fields() {
            out.push(ORDER_SBA);
            out.extend_from_slice(&encode_address(field.address_start));
            out.push(ORDER_SF);
            out.extend_from_slice(field.data());
        }
        out
    }

    /// Read Modified payload: modified unprotected fields
    pub fn read_modified(&self) -> Vec<u8> {
        self.read_fields(|f| f.is_modified() && !f.is_protected())
    }

    pub fn read_all_unprotected(&self) -> Vec<u8> {
        self.read_fields(|f| !f.is_protected())
    }

    /// Every modified field, protected or not
    pub fn read_all_modified(&self) -> Vec<u8> {
        self.read_fields(Field::is_modified)
    }

    // SBA to the first cell, then the cells with nulls suppressed
    fn read_fields(&self, predicate: impl Fn(&Field) -> bool) -> Vec<u8> {
        let mut out = Vec::new();
        for field in self.current_fields().filter(|f| predicate(f)) {
            out.push(ORDER_SBA);
            out.extend_from_slice(&encode_address(
                self.model.add_to_address(1, field.address_start),
            ));
            out.extend(field.cells().iter().copied().filter(|&b| b != 0x00));
        }
        out
    }
}

impl fmt::Display for ScreenBuffer {
    /// Plain text dump, one line per row
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size();
        let mut cells = vec![' '; size];

        let visible = self
            .fields
            .iter()
            .rposition(|field| !field.is_useless())
            .map_or(0, |last| last + 1);

        for field in &self.fields[..visible] {
            for (offset, &byte) in field.cells().iter().enumerate() {
                let index = (field.address_start as usize + 1 + offset) % size;
                let ch = self.translator.decode_byte(byte);
                cells[index] = if byte == 0x00 || ch.is_control() { ' ' } else { ch };
            }
            cells[field.address_start as usize % size] = ' ';
        }

        let cols = self.cols();
        for (row, line) in cells.chunks(cols).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            let text: String = line.iter().collect();
            f.write_str(&text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib3270::orders::OrderRegistry;
    use crate::protocol_common::ebcdic::Cp037Translator;

    fn screen() -> ScreenBuffer {
        ScreenBuffer::new(TerminalModel::Model2, Arc::new(Cp037Translator))
    }

    #[test]
    fn test_add_field_pads_previous() {
        let mut screen = screen();
        screen.add_field(Field::with_attribute(0x20));
        screen.set_buffer_address(5);
        screen.add_field(Field::new(vec![0x00, 0xC8, 0xC9]));

        let fields = screen.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].len(), 5);
        assert_eq!(fields[0].address_end, 5);
        assert_eq!(fields[1].address_start, 5);
        assert_eq!(fields[1].address_end, 8);
        assert_eq!(screen.buffer_address(), 8);
    }

    #[test]
    fn test_useless_field_elision() {
        let mut screen = screen();
        screen.add_field(Field::with_attribute(0x30));
        assert_eq!(screen.buffer_address(), 1);

        screen.add_field(Field::with_attribute(0x00));
        assert_eq!(screen.fields().len(), 1);
        assert_eq!(screen.fields()[0].address_start, 2);
    }

    #[test]
    fn test_write_string_into_unprotected_field() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x00, 0x00, 0x00, 0x00]));
        screen.write_string("AB", Some((0, 1))).unwrap();

        assert_eq!(screen.fields()[0].cells(), &[0xC1, 0xC2, 0x00]);
        assert!(screen.fields()[0].is_modified());
        assert_eq!(screen.cursor_address(), 3);
    }

    #[test]
    fn test_write_string_rejections() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x20, 0x40, 0x40]));
        screen.add_field(Field::new(vec![0x00, 0x40, 0x40]));

        let err = screen.write_string("X", Some((0, 1))).unwrap_err();
        assert_eq!(err, WriteError::ProtectedField { address: 1 });
        assert_eq!(screen.cursor_address(), 0);
        assert_eq!(screen.fields()[0].cells(), &[0x40, 0x40]);

        let err = screen.write_string("XYZ", Some((0, 4))).unwrap_err();
        assert!(matches!(err, WriteError::InsufficientRoom { needed: 3, available: 2, .. }));

        let err = screen.write_string("X", Some((0, 3))).unwrap_err();
        assert_eq!(err, WriteError::AttributePosition { address: 3 });

        let err = screen.write_string("X", Some((1, 0))).unwrap_err();
        assert_eq!(err, WriteError::NoField { address: 80 });
    }

    #[test]
    fn test_write_string_skips_autoskip_field() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x30, 0x40]));
        screen.add_field(Field::new(vec![0x00, 0x00, 0x00]));

        screen.write_string("Q", Some((0, 1))).unwrap();
        assert_eq!(screen.fields()[1].cells(), &[0xD8, 0x00]);
        assert_eq!(screen.cursor_address(), 4);
    }

    #[test]
    fn test_reset_modified_restores_backup() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x00, 0x40, 0x40]));
        screen.write_string("A", Some((0, 1))).unwrap();
        screen.reset_modified();

        let field = &screen.fields()[0];
        assert_eq!(field.cells(), &[0x40, 0x40]);
        assert!(!field.is_modified());
    }

    #[test]
    fn test_reads_filter_current_generation() {
        let mut screen = screen();
        screen.new_screen();
        screen.add_field(Field::new(vec![0x20, 0xC1]));
        screen.add_field(Field::new(vec![0x00, 0xC2, 0x00]));
        screen.write_string("Z", Some((0, 4))).unwrap();

        assert_eq!(
            screen.read_buffer(),
            vec![0x11, 0x40, 0x40, 0x1D, 0x20, 0xC1, 0x11, 0x40, 0xC2, 0x1D, 0x01, 0xC2, 0xE9]
        );
        assert_eq!(screen.read_modified(), vec![0x11, 0x40, 0xC3, 0xC2, 0xE9]);
        assert_eq!(screen.read_all_unprotected(), screen.read_modified());

        screen.new_screen();
        assert!(screen.read_buffer().is_empty());
        assert!(screen.read_all_modified().is_empty());
    }

    #[test]
    fn test_erase_all_unprotected() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x20, 0xC1]));
        screen.add_field(Field::new(vec![0x01, 0xC2, 0xC3]));
        screen.set_cursor_address(100);
        screen.erase_all_unprotected();

        assert_eq!(screen.fields()[0].cells(), &[0xC1]);
        assert_eq!(screen.fields()[1].cells(), &[0x00, 0x00]);
        assert!(!screen.fields()[1].is_modified());
        assert_eq!(screen.cursor_address(), 3);
    }

    #[test]
    fn test_find_field_and_text() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x20, 0xC8, 0xC9]));
        screen.add_field(Field::new(vec![0x00, 0x40]));

        assert_eq!(screen.find_field(1).map(|f| f.address_start), Some(0));
        assert_eq!(screen.find_field(3).map(|f| f.address_start), Some(3));
        assert!(screen.find_field(10).is_none());
        assert_eq!(screen.find_text("HI").map(|f| f.address_start), Some(0));
        assert!(screen.find_text("NO").is_none());
        assert_eq!(screen.field_text(&screen.fields()[0]), "HI");
    }

    #[test]
    fn test_display_dump() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x20, 0xC8, 0xC9]));
        screen.add_field(Field::with_attribute(0x30));

        let text = screen.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 24);
        assert!(lines[0].starts_with(" HI "));
        assert_eq!(lines[0].len(), 80);

        screen.strip_useless_fields();
        assert_eq!(screen.fields().len(), 1);
    }

    fn assert_address_order(screen: &ScreenBuffer) {
        for pair in screen.fields().windows(2) {
            assert!(
                pair[0].address_start as usize + pair[0].len() <= pair[1].address_start as usize,
                "field at {} runs into field at {}",
                pair[0].address_start,
                pair[1].address_start
            );
        }
    }

    #[test]
    fn test_write_behind_last_field_splits_earlier_field() {
        let registry = OrderRegistry::new();
        let mut screen = screen();
        let [a1, a2] = screen.encode_address(100);
        registry.interpret(
            &[0x1D, 0x20, 0xC8, 0xC5, 0xD3, 0xD3, 0xD6, 0x11, a1, a2, 0x1D, 0x00],
            &mut screen,
        );
        assert_eq!(screen.fields()[0].len(), 100);

        let [b1, b2] = screen.encode_address(50);
        registry.interpret(&[0x11, b1, b2, 0x1D, 0x20, 0xE7], &mut screen);

        assert_address_order(&screen);
        let fields = screen.fields();
        let starts: Vec<u16> = fields.iter().map(|f| f.address_start).collect();
        assert_eq!(starts, vec![0, 50, 100]);
        assert_eq!(fields[0].generation, 1);
        assert!(fields[0].is_protected());
        assert_eq!(fields[0].address_end, 50);
        assert_eq!(screen.field_text(&fields[0]), "HELLO");
        assert_eq!(screen.field_text(&fields[1]), "X");
        assert_eq!(fields[1].address_end, 100);
        assert_eq!(fields[2].generation, 1);
        assert_eq!(screen.buffer_address(), 52);

        let text = screen.to_string();
        let row = text.lines().next().unwrap();
        assert!(row.starts_with(" HELLO "));
        assert_eq!(&row[50..52], " X");

        let err = screen.write_string("ZZ", Some((0, 1))).unwrap_err();
        assert_eq!(err, WriteError::ProtectedField { address: 1 });
        assert_eq!(screen.field_text(&screen.fields()[0]), "HELLO");
    }

    #[test]
    fn test_add_field_before_existing_keeps_address_order() {
        let mut screen = screen();
        screen.set_buffer_address(10);
        screen.add_field(Field::new(vec![0x20, 0xC1, 0xC2]));
        screen.set_buffer_address(2);
        screen.add_field(Field::with_attribute(0x00));

        assert_address_order(&screen);
        let fields = screen.fields();
        assert_eq!(fields[0].address_start, 2);
        assert_eq!(fields[0].len(), 8);
        assert_eq!(fields[0].address_end, 10);
        assert_eq!(fields[1].address_start, 10);
        assert_eq!(fields[1].cells(), &[0xC1, 0xC2]);
        assert_eq!(screen.buffer_address(), 3);

        screen.write_string("Q", Some((0, 3))).unwrap();
        assert_eq!(screen.fields()[0].cells()[0], 0xD8);
    }

    #[test]
    fn test_add_field_over_existing_attribute_merges_tail() {
        let mut screen = screen();
        screen.add_field(Field::with_attribute(0x00));
        screen.set_buffer_address(5);
        screen.add_field(Field::new(vec![0x20, 0xC1, 0xC2, 0xC3]));

        screen.set_buffer_address(3);
        screen.add_field(Field::new(vec![0x00, 0xC4, 0xC4, 0xC4, 0xC4]));

        assert_address_order(&screen);
        let fields = screen.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].len(), 3);
        assert_eq!(fields[1].address_start, 3);
        assert_eq!(fields[1].cells(), &[0xC4, 0xC4, 0xC4, 0xC4, 0xC3]);
        assert!(!fields[1].is_protected());
        assert_eq!(screen.buffer_address(), 8);
    }

    #[test]
    fn test_field_at_same_address_is_replaced() {
        let mut screen = screen();
        screen.add_field(Field::new(vec![0x20, 0xC1]));
        screen.set_buffer_address(0);
        screen.add_field(Field::new(vec![0x00, 0xC2]));

        assert_eq!(screen.fields().len(), 1);
        assert!(!screen.fields()[0].is_protected());
        assert_eq!(screen.fields()[0].cells(), &[0xC2]);
    }

    #[test]
    fn test_write_string_into_bare_attribute_field() {
        let mut screen = screen();
        screen.add_field(Field::new(Vec::new()));
        let err = screen.write_string("A", Some((0, 0))).unwrap_err();
        assert_eq!(err, WriteError::AttributePosition { address: 0 });
        let err = screen.write_string("A", Some((0, 1))).unwrap_err();
        assert_eq!(err, WriteError::NoField { address: 1 });
    }
}
