//! 3270 order interpreter
//!
//! A Write or Erase/Write payload is scanned once. Every byte that matches a
//! registered order code opens a new [`OrderNode`]; the bytes that follow
//! belong to that node until the next order code. Built-in orders first
//! take a fixed number of operand bytes, so an address byte that happens to
//! equal an order code is never mistaken for one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::codes::{ORDER_IC, ORDER_RA, ORDER_SBA, ORDER_SF};
use super::field::Field;
use super::screen::ScreenBuffer;

/// Orders the interpreter executes out of the box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    StartField,
    SetBufferAddress,
    InsertCursor,
    RepeatToAddress,
}

impl OrderKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            ORDER_SF => Some(Self::StartField),
            ORDER_SBA => Some(Self::SetBufferAddress),
            ORDER_IC => Some(Self::InsertCursor),
            ORDER_RA => Some(Self::RepeatToAddress),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::StartField => ORDER_SF,
            Self::SetBufferAddress => ORDER_SBA,
            Self::InsertCursor => ORDER_IC,
            Self::RepeatToAddress => ORDER_RA,
        }
    }

    /// Bytes always consumed as operands after the order code
    pub fn operand_len(self) -> usize {
        match self {
            Self::StartField => 1,
            Self::SetBufferAddress => 2,
            Self::InsertCursor => 0,
            Self::RepeatToAddress => 3,
        }
    }

    pub fn execute(self, data: &[u8], screen: &mut ScreenBuffer) {
        match self {
            Self::StartField => start_field(data, screen),
            Self::SetBufferAddress => set_buffer_address(data, screen),
            Self::InsertCursor => screen.set_cursor_address(screen.buffer_address()),
            Self::RepeatToAddress => repeat_to_address(data, screen),
        }
    }
}

/// Attribute byte plus any trailing cells become a new field
fn start_field(data: &[u8], screen: &mut ScreenBuffer) {
    let field = if data.is_empty() {
        Field::with_attribute(0x00)
    } else {
        Field::new(data.to_vec())
    };
    screen.add_field(field);
}

fn set_buffer_address(data: &[u8], screen: &mut ScreenBuffer) {
    match data {
        [b1, b2, rest @ ..] => {
            if !rest.is_empty() {
                log::debug!("SBA: ignoring {} trailing bytes", rest.len());
            }
            let address = screen.decode_address(*b1, *b2);
            screen.set_buffer_address(address);
        }
        _ => log::warn!("SBA: expected 2 address bytes, got {}", data.len()),
    }
}

/// Extend the field before the buffer address with `fill` up to the target, then re-add it
fn repeat_to_address(data: &[u8], screen: &mut ScreenBuffer) {
    let [b1, b2, fill, rest @ ..] = data else {
        log::warn!("RA: expected address and fill byte, got {} bytes", data.len());
        return;
    };
    let target = screen.decode_address(*b1, *b2);
    let length = screen.distance(screen.buffer_address(), target);

    let Some(mut field) = screen.take_field_before(screen.buffer_address()) else {
        log::debug!("RA: no field to repeat into, moving to {}", target);
        screen.set_buffer_address(target);
        return;
    };

    screen.set_buffer_address(field.address_start);
    let mut cells = vec![*fill; length];
    cells.extend_from_slice(rest);
    field.append_data(&cells);
    screen.add_field(field);
}

/// Extension point for orders beyond the built-in set
pub trait OrderHandler: Send + Sync + fmt::Debug {
    /// Bytes always consumed as operands after the order code
    fn operand_len(&self) -> usize {
        0
    }

    fn execute(&self, data: &[u8], screen: &mut ScreenBuffer);
}

/// What an order code is bound to in the registry
#[derive(Debug, Clone)]
pub enum OrderBinding {
    Builtin(OrderKind),
    Custom(Arc<dyn OrderHandler>),
}

impl OrderBinding {
    pub fn operand_len(&self) -> usize {
        match self {
            Self::Builtin(kind) => kind.operand_len(),
            Self::Custom(handler) => handler.operand_len(),
        }
    }

    pub fn execute(&self, data: &[u8], screen: &mut ScreenBuffer) {
        match self {
            Self::Builtin(kind) => kind.execute(data, screen),
            Self::Custom(handler) => handler.execute(data, screen),
        }
    }
}

/// One order from the data stream with the bytes that followed it
#[derive(Debug, Clone)]
pub struct OrderNode {
    pub code: u8,
    binding: OrderBinding,
    pub data: Vec<u8>,
}

impl OrderNode {
    pub fn execute(&self, screen: &mut ScreenBuffer) {
        self.binding.execute(&self.data, screen);
    }
}

/// Order code to handler map
#[derive(Debug, Clone)]
pub struct OrderRegistry {
    bindings: HashMap<u8, OrderBinding>,
}

impl OrderRegistry {
    /// Registry with SF, SBA, IC and RA bound to the built-in handlers
    pub fn new() -> Self {
        let bindings = [
            OrderKind::StartField,
            OrderKind::SetBufferAddress,
            OrderKind::InsertCursor,
            OrderKind::RepeatToAddress,
        ]
        .into_iter()
        .map(|kind| (kind.code(), OrderBinding::Builtin(kind)))
        .collect();
        Self { bindings }
    }

    /// Bind `code` to `handler`, replacing any existing binding
    pub fn register(&mut self, code: u8, handler: Arc<dyn OrderHandler>) {
        log::debug!("registering order handler for 0x{:02x}", code);
        self.bindings.insert(code, OrderBinding::Custom(handler));
    }

    pub fn get(&self, code: u8) -> Option<&OrderBinding> {
        self.bindings.get(&code)
    }

    pub fn is_order(&self, code: u8) -> bool {
        self.bindings.contains_key(&code)
    }

    /// Split a payload into order nodes
    pub fn parse(&self, data: &[u8]) -> Vec<OrderNode> {
        let mut nodes: Vec<OrderNode> = Vec::new();
        let mut operands_left = 0usize;
        let mut skipped = 0usize;

        for &byte in data {
            if operands_left > 0 {
                operands_left -= 1;
            } else if let Some(binding) = self.bindings.get(&byte) {
                operands_left = binding.operand_len();
                nodes.push(OrderNode {
                    code: byte,
                    binding: binding.clone(),
                    data: Vec::new(),
                });
                continue;
            }

            match nodes.last_mut() {
                Some(node) => node.data.push(byte),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!("ignored {} bytes before the first order", skipped);
        }
        nodes
    }

    /// Parse and run a payload against the screen
    ///
    /// When at least one order is found a new write cycle starts before the
    /// orders execute. Returns whether anything executed.
    pub fn interpret(&self, data: &[u8], screen: &mut ScreenBuffer) -> bool {
        let nodes = self.parse(data);
        if nodes.is_empty() {
            return false;
        }

        screen.new_screen();
        for node in &nodes {
            node.execute(screen);
        }
        log::debug!("executed {} orders", nodes.len());
        true
    }
}

impl Default for OrderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib3270::address::TerminalModel;
    use crate::protocol_common::ebcdic::Cp037Translator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn screen() -> ScreenBuffer {
        ScreenBuffer::new(TerminalModel::Model2, Arc::new(Cp037Translator))
    }

    #[test]
    fn test_parse_groups_data_with_orders() {
        let registry = OrderRegistry::new();
        let nodes = registry.parse(&[0xC1, 0x1D, 0x20, 0xC8, 0x11, 0x40, 0xC5, 0x13]);

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].code, ORDER_SF);
        assert_eq!(nodes[0].data, vec![0x20, 0xC8]);
        assert_eq!(nodes[1].code, ORDER_SBA);
        assert_eq!(nodes[1].data, vec![0x40, 0xC5]);
        assert_eq!(nodes[2].code, ORDER_IC);
        assert!(nodes[2].data.is_empty());
    }

    #[test]
    fn test_operand_bytes_are_not_orders() {
        let registry = OrderRegistry::new();
        // SBA whose second address byte is 0x13 (IC), SF with attribute 0x1D
        let nodes = registry.parse(&[0x11, 0x00, 0x13, 0x1D, 0x1D]);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].data, vec![0x00, 0x13]);
        assert_eq!(nodes[1].data, vec![0x1D]);
    }

    #[test]
    fn test_interpret_builds_fields() {
        let registry = OrderRegistry::new();
        let mut screen = screen();
        let executed = registry.interpret(
            &[0x1D, 0x20, 0x11, 0x40, 0xC5, 0x1D, 0x00, 0xC8, 0xC9, 0x13],
            &mut screen,
        );

        assert!(executed);
        assert_eq!(screen.generation(), 1);
        let fields = screen.fields();
        assert_eq!(fields.len(), 2);
        assert!(fields[0].is_protected());
        assert_eq!(fields[1].address_start, 5);
        assert_eq!(screen.field_text(&fields[1]), "HI");
        assert_eq!(screen.cursor_address(), 8);
    }

    #[test]
    fn test_interpret_without_orders_is_noop() {
        let registry = OrderRegistry::new();
        let mut screen = screen();
        assert!(!registry.interpret(&[0xC1, 0xC2], &mut screen));
        assert_eq!(screen.generation(), 0);
    }

    #[test]
    fn test_repeat_to_address_fills_last_field() {
        let registry = OrderRegistry::new();
        let mut screen = screen();
        // SF(0x00) then RA to address 10 with '-' (0x60), then 'A'
        registry.interpret(&[0x1D, 0x00, 0x3C, 0x40, 0x4A, 0x60, 0xC1], &mut screen);

        let field = &screen.fields()[0];
        assert_eq!(field.address_start, 0);
        assert_eq!(field.cells().len(), 10);
        assert!(field.cells()[..9].iter().all(|&b| b == 0x60));
        assert_eq!(field.cells()[9], 0xC1);
        assert_eq!(screen.buffer_address(), 11);
    }

    #[test]
    fn test_repeat_to_address_without_field_moves_buffer() {
        let registry = OrderRegistry::new();
        let mut screen = screen();
        registry.interpret(&[0x3C, 0x40, 0x4A, 0x60], &mut screen);
        assert!(screen.fields().is_empty());
        assert_eq!(screen.buffer_address(), 10);
    }

    #[derive(Debug, Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl OrderHandler for CountingHandler {
        fn operand_len(&self) -> usize {
            1
        }

        fn execute(&self, data: &[u8], screen: &mut ScreenBuffer) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            screen.set_cursor_address(data[0] as u16);
        }
    }

    #[test]
    fn test_custom_handler_registration() {
        let mut registry = OrderRegistry::new();
        let handler = Arc::new(CountingHandler::default());
        registry.register(0x05, handler.clone());
        assert!(registry.is_order(0x05));

        let mut screen = screen();
        registry.interpret(&[0x05, 0x07], &mut screen);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(screen.cursor_address(), 7);
    }
}
