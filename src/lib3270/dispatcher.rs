//! Executes completed inbound records
//!
//! The first byte of a record (after the TN3270E header, when active) is the
//! write-class command. Writes update the screen through the order registry,
//! reads and queries answer the host with an outbound record.

use super::address::{encode_address, TerminalModel};
use super::codes::*;
use super::message::Message;
use super::orders::OrderRegistry;
use super::screen::ScreenBuffer;
use crate::error::DataStreamError;
use crate::events::{Effects, SessionEvent};
use crate::protocol_common::telnet_base::{escape_iac, EOR, IAC};

/// Frame an outbound 3270 record
///
/// A zeroed TN3270E header goes in front when TN3270E is active, every 0xFF
/// in the payload is doubled and `IAC EOR` closes the record.
pub fn outbound_record(payload: &[u8], tn3270e: bool) -> Vec<u8> {
    let mut record = Vec::with_capacity(payload.len() + TN3270E_HEADER_LEN + 2);
    if tn3270e {
        record.extend_from_slice(&[TN3270E_DT_3270_DATA, 0x00, 0x00, 0x00, 0x00]);
    }
    record.extend(escape_iac(payload));
    record.extend_from_slice(&[IAC, EOR]);
    record
}

/// Query Reply answering Read Partition Query, geometry taken from `model`
pub fn query_reply(model: TerminalModel) -> Vec<u8> {
    let cols = (model.cols() as u16).to_be_bytes();
    let rows = (model.rows() as u16).to_be_bytes();
    let size = (model.buffer_size() as u16).to_be_bytes();

    let mut reply = vec![AID_STRUCTURED_FIELD];

    // Summary
    reply.extend_from_slice(&[
        0x00, 0x0e, 0x81, 0x80, 0x80, 0x81, 0x84, 0x85, 0x86, 0x87, 0x88, 0x95, 0xa1, 0xa6,
    ]);

    // Usable Area: 12/14 bit addressing, cell size and buffer size
    reply.extend_from_slice(&[0x00, 0x17, 0x81, 0x81, 0x01, 0x00]);
    reply.extend_from_slice(&cols);
    reply.extend_from_slice(&rows);
    reply.extend_from_slice(&[0x01, 0x00, 0x0a, 0x02, 0xe5, 0x00, 0x02, 0x00, 0x6f, 0x09, 0x0c]);
    reply.extend_from_slice(&size);

    // Alphanumeric Partitions
    reply.extend_from_slice(&[0x00, 0x08, 0x81, 0x84, 0x00]);
    reply.extend_from_slice(&size);
    reply.push(0x00);

    // Character Sets
    reply.extend_from_slice(&[
        0x00, 0x1b, 0x81, 0x85, 0x82, 0x00, 0x09, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00,
        0x10, 0x00, 0x02, 0xb9, 0x00, 0x25, 0x01, 0x10, 0xf1, 0x03, 0xc3, 0x01, 0x36,
    ]);

    // Color
    reply.extend_from_slice(&[0x00, 0x26, 0x81, 0x86, 0x00, 0x10, 0x00, 0xf4]);
    for color in 0xf1..=0xffu8 {
        reply.extend_from_slice(&[color, color]);
    }

    // Highlight
    reply.extend_from_slice(&[
        0x00, 0x0f, 0x81, 0x87, 0x05, 0x00, 0xf0, 0xf1, 0xf1, 0xf2, 0xf2, 0xf4, 0xf4, 0xf8, 0xf8,
    ]);

    // Reply Modes
    reply.extend_from_slice(&[0x00, 0x07, 0x81, 0x88, 0x00, 0x01, 0x02]);

    // DDM
    reply.extend_from_slice(&[
        0x00, 0x0c, 0x81, 0x95, 0x00, 0x00, 0x10, 0x00, 0x10, 0x00, 0x01, 0x01,
    ]);

    // RPQ Names
    reply.extend_from_slice(&[
        0x00, 0x12, 0x81, 0xa1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0xa3,
        0xf3, 0xf2, 0xf7, 0xf0,
    ]);

    // Implicit Partition: default 80x24, alternate is the model size
    reply.extend_from_slice(&[
        0x00, 0x11, 0x81, 0xa6, 0x00, 0x00, 0x0b, 0x01, 0x00, 0x00, 0x50, 0x00, 0x18,
    ]);
    reply.extend_from_slice(&cols);
    reply.extend_from_slice(&rows);

    reply
}

/// Attention and keyboard state plus the command handlers
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    aid: AidKey,
    keyboard_locked: bool,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            aid: AidKey::NoAid,
            keyboard_locked: false,
        }
    }

    /// AID reported in read responses
    pub fn aid(&self) -> AidKey {
        self.aid
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    /// Run one completed record
    ///
    /// An error means the data stream cannot be trusted and the session
    /// must disconnect.
    pub fn dispatch(
        &mut self,
        mut message: Message,
        tn3270e: bool,
        screen: &mut ScreenBuffer,
        orders: &OrderRegistry,
        effects: &mut Effects,
    ) -> Result<(), DataStreamError> {
        if tn3270e {
            let header = message.parse_header()?;
            if !header.is_3270_data() {
                log::debug!("skipping record with data type 0x{:02x}", header.data_type);
                return Ok(());
            }
        }

        let Some((&operation, data)) = message.data().split_first() else {
            log::warn!("record {} has no operation code", message.id);
            return Ok(());
        };

        let Some(command) = CommandCode::from_u8(operation) else {
            log::error!("unhandled operation: 0x{:02x}", operation);
            return Err(DataStreamError::UnhandledOperation(operation));
        };
        log::debug!("processing {:?} ({} bytes)", command, data.len());

        match command {
            CommandCode::Write => self.process_write(data, false, screen, orders, effects),
            CommandCode::EraseWrite => self.process_write(data, true, screen, orders, effects),
            CommandCode::WriteStructuredField => {
                self.process_structured_fields(data, tn3270e, screen, effects)?
            }
            CommandCode::ReadBuffer => {
                let payload = screen.read_buffer();
                self.read_response(&payload, tn3270e, screen, effects);
            }
            CommandCode::ReadModified => {
                let payload = screen.read_modified();
                self.read_response(&payload, tn3270e, screen, effects);
            }
            CommandCode::ReadModifiedAll => {
                let payload = screen.read_all_modified();
                self.read_response(&payload, tn3270e, screen, effects);
            }
            CommandCode::EraseAllUnprotected => {
                screen.erase_all_unprotected();
                self.aid = AidKey::NoAid;
                self.unlock_keyboard(effects);
                effects.emit(SessionEvent::ScreenUpdate);
            }
        }
        Ok(())
    }

    /// Send an attention: AID, cursor address, then `payload`
    pub fn send_aid(
        &mut self,
        aid: AidKey,
        payload: &[u8],
        tn3270e: bool,
        screen: &ScreenBuffer,
        effects: &mut Effects,
    ) {
        self.aid = aid;
        self.lock_keyboard(effects);
        self.read_response(payload, tn3270e, screen, effects);
    }

    /// Forget AID and keyboard state, used on disconnect
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn process_write(
        &mut self,
        data: &[u8],
        erase: bool,
        screen: &mut ScreenBuffer,
        orders: &OrderRegistry,
        effects: &mut Effects,
    ) {
        let orders_data = match data.split_first() {
            Some((&wcc, rest)) => {
                self.apply_wcc(wcc, screen, effects);
                rest
            }
            None => {
                log::warn!("write without WCC");
                data
            }
        };

        if erase {
            screen.erase_all();
            self.aid = AidKey::NoAid;
        }

        if orders.interpret(orders_data, screen) {
            effects.emit(SessionEvent::ScreenUpdate);
        }
    }

    fn apply_wcc(&mut self, wcc: u8, screen: &mut ScreenBuffer, effects: &mut Effects) {
        if wcc & WCC_RESTORE != 0 {
            self.unlock_keyboard(effects);
        }
        if wcc & WCC_RESET_MDT != 0 {
            screen.reset_modified();
        }
    }

    fn process_structured_fields(
        &mut self,
        mut data: &[u8],
        tn3270e: bool,
        screen: &ScreenBuffer,
        effects: &mut Effects,
    ) -> Result<(), DataStreamError> {
        while !data.is_empty() {
            let [len_hi, len_lo, id, ..] = *data else {
                return Err(DataStreamError::TruncatedStructuredField {
                    expected: 3,
                    available: data.len(),
                });
            };

            let length = match u16::from_be_bytes([len_hi, len_lo]) as usize {
                0 => data.len(),
                n if n < 3 || n > data.len() => {
                    return Err(DataStreamError::TruncatedStructuredField {
                        expected: n,
                        available: data.len(),
                    })
                }
                n => n,
            };
            let payload = &data[3..length];
            data = &data[length..];

            match id {
                SF_READ_PARTITION => self.read_partition(payload, tn3270e, screen, effects)?,
                other => {
                    log::error!("unhandled structured field: 0x{:02x}", other);
                    return Err(DataStreamError::UnhandledStructuredField(other));
                }
            }
        }
        Ok(())
    }

    fn read_partition(
        &mut self,
        payload: &[u8],
        tn3270e: bool,
        screen: &ScreenBuffer,
        effects: &mut Effects,
    ) -> Result<(), DataStreamError> {
        match payload.first() {
            Some(&SF_RP_PARTITION_ALL) => {}
            Some(&partition) => {
                log::error!("invalid read partition suboption");
                return Err(DataStreamError::InvalidReadPartition { partition });
            }
            None => {
                return Err(DataStreamError::TruncatedStructuredField {
                    expected: 4,
                    available: 3,
                })
            }
        }

        match payload.get(1) {
            Some(&SF_RP_QUERY) | Some(&SF_RP_QUERY_LIST) => {
                log::debug!("answering read partition query");
                effects.write(outbound_record(&query_reply(screen.model()), tn3270e));
            }
            other => log::error!("unhandled read partition type: {:?}", other),
        }
        Ok(())
    }

    fn read_response(
        &self,
        payload: &[u8],
        tn3270e: bool,
        screen: &ScreenBuffer,
        effects: &mut Effects,
    ) {
        let mut response = Vec::with_capacity(payload.len() + 3);
        response.push(self.aid.to_u8());
        response.extend_from_slice(&encode_address(screen.cursor_address()));
        response.extend_from_slice(payload);
        effects.write(outbound_record(&response, tn3270e));
    }

    fn lock_keyboard(&mut self, effects: &mut Effects) {
        self.keyboard_locked = true;
        effects.emit(SessionEvent::KeyboardLock);
    }

    fn unlock_keyboard(&mut self, effects: &mut Effects) {
        self.keyboard_locked = false;
        effects.emit(SessionEvent::KeyboardUnlock);
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_common::ebcdic::Cp037Translator;
    use std::sync::Arc;

    fn screen() -> ScreenBuffer {
        ScreenBuffer::new(TerminalModel::Model2, Arc::new(Cp037Translator))
    }

    fn message(bytes: &[u8]) -> Message {
        let mut message = Message::new();
        for &byte in bytes {
            message.push_byte(byte);
        }
        message.set_complete();
        message
    }

    fn run(dispatcher: &mut CommandDispatcher, screen: &mut ScreenBuffer, bytes: &[u8]) -> Effects {
        let mut effects = Effects::new();
        dispatcher
            .dispatch(message(bytes), false, screen, &OrderRegistry::new(), &mut effects)
            .unwrap();
        effects
    }

    #[test]
    fn test_erase_write_builds_screen() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let effects = run(
            &mut dispatcher,
            &mut screen,
            &[0xF5, 0xC3, 0x1D, 0x20, 0x11, 0x40, 0xC5, 0x1D, 0x00, 0xC8, 0xC9],
        );

        assert_eq!(
            effects.events,
            vec![SessionEvent::KeyboardUnlock, SessionEvent::ScreenUpdate]
        );
        assert_eq!(screen.fields().len(), 2);
        assert_eq!(screen.field_text(&screen.fields()[1]), "HI");
        assert!(!dispatcher.is_keyboard_locked());
    }

    #[test]
    fn test_write_without_orders_has_no_screen_update() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let effects = run(&mut dispatcher, &mut screen, &[0xF1, 0x00]);
        assert!(effects.events.is_empty());
    }

    #[test]
    fn test_wcc_reset_mdt_restores_fields() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        run(&mut dispatcher, &mut screen, &[0xF5, 0x00, 0x1D, 0x00, 0xC1, 0xC2, 0xC3]);
        screen.write_string("Z", Some((0, 1))).unwrap();
        assert!(screen.fields()[0].is_modified());

        run(&mut dispatcher, &mut screen, &[0xF1, WCC_RESET_MDT]);
        let field = &screen.fields()[0];
        assert!(!field.is_modified());
        assert_eq!(screen.field_text(field), "ABC");
    }

    #[test]
    fn test_read_modified_uses_aid_and_cursor() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        run(&mut dispatcher, &mut screen, &[0xF5, 0x00, 0x1D, 0x00, 0x00, 0x00, 0x00]);
        screen.write_string("A", Some((0, 1))).unwrap();

        let effects = run(&mut dispatcher, &mut screen, &[CMD_READ_MODIFIED]);
        assert_eq!(
            effects.outbound,
            vec![vec![AID_NO_AID, 0x40, 0xC2, ORDER_SBA, 0x40, 0xC1, 0xC1, IAC, EOR]]
        );
    }

    #[test]
    fn test_read_buffer_includes_attributes() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        run(&mut dispatcher, &mut screen, &[0xF5, 0x00, 0x1D, 0x20, 0xC1]);
        let effects = run(&mut dispatcher, &mut screen, &[CMD_SNA_READ_BUFFER]);
        assert_eq!(
            effects.outbound,
            vec![vec![AID_NO_AID, 0x40, 0x40, ORDER_SBA, 0x40, 0x40, ORDER_SF, 0x20, 0xC1, IAC, EOR]]
        );
    }

    #[test]
    fn test_read_partition_query() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let effects = run(&mut dispatcher, &mut screen, &[0xF3, 0x00, 0x05, 0x01, 0xFF, 0x02]);
        assert_eq!(effects.outbound.len(), 1);
        assert_eq!(
            effects.outbound[0],
            outbound_record(&query_reply(TerminalModel::Model2), false)
        );
    }

    #[test]
    fn test_read_partition_bad_partition_is_fatal() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let mut effects = Effects::new();
        let err = dispatcher
            .dispatch(
                message(&[0xF3, 0x00, 0x05, 0x01, 0x00, 0x02]),
                false,
                &mut screen,
                &OrderRegistry::new(),
                &mut effects,
            )
            .unwrap_err();
        assert_eq!(err, DataStreamError::InvalidReadPartition { partition: 0x00 });
    }

    #[test]
    fn test_unknown_structured_field_is_fatal() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let mut effects = Effects::new();
        let result = dispatcher.dispatch(
            message(&[0xF3, 0x00, 0x04, 0x40, 0x00]),
            false,
            &mut screen,
            &OrderRegistry::new(),
            &mut effects,
        );
        assert_eq!(result, Err(DataStreamError::UnhandledStructuredField(0x40)));
    }

    #[test]
    fn test_unknown_operation_is_fatal() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let mut effects = Effects::new();
        let result = dispatcher.dispatch(
            message(&[0x42]),
            false,
            &mut screen,
            &OrderRegistry::new(),
            &mut effects,
        );
        assert_eq!(result, Err(DataStreamError::UnhandledOperation(0x42)));
    }

    #[test]
    fn test_tn3270e_non_data_records_are_skipped() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        let mut effects = Effects::new();
        dispatcher
            .dispatch(
                message(&[TN3270E_DT_SSCP_LU_DATA, 0, 0, 0, 0, 0x42]),
                true,
                &mut screen,
                &OrderRegistry::new(),
                &mut effects,
            )
            .unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_send_aid_locks_keyboard() {
        let mut dispatcher = CommandDispatcher::new();
        let screen = screen();
        let mut effects = Effects::new();
        dispatcher.send_aid(AidKey::PF(5), &[0xFF], true, &screen, &mut effects);

        assert!(dispatcher.is_keyboard_locked());
        assert_eq!(dispatcher.aid(), AidKey::PF(5));
        assert_eq!(effects.events, vec![SessionEvent::KeyboardLock]);
        assert_eq!(
            effects.outbound,
            vec![vec![0, 0, 0, 0, 0, 0xF5, 0x40, 0x40, 0xFF, 0xFF, IAC, EOR]]
        );
    }

    #[test]
    fn test_erase_all_unprotected() {
        let mut dispatcher = CommandDispatcher::new();
        let mut screen = screen();
        run(&mut dispatcher, &mut screen, &[0xF5, 0x00, 0x1D, 0x20, 0xC1, 0x1D, 0x00, 0xC2]);
        let effects = run(&mut dispatcher, &mut screen, &[CMD_SNA_ERASE_ALL_UNPROTECTED]);

        assert_eq!(
            effects.events,
            vec![SessionEvent::KeyboardUnlock, SessionEvent::ScreenUpdate]
        );
        assert_eq!(screen.field_text(&screen.fields()[0]), "A");
        assert_eq!(screen.field_text(&screen.fields()[1]), "");
        assert_eq!(screen.cursor_address(), 3);
    }

    #[test]
    fn test_query_reply_model_2_layout() {
        let reply = query_reply(TerminalModel::Model2);
        assert_eq!(reply[0], AID_STRUCTURED_FIELD);
        // Usable area columns, rows and buffer size
        assert_eq!(&reply[21..25], &[0x00, 0x50, 0x00, 0x18]);
        assert_eq!(&reply[36..38], &[0x07, 0x80]);
        // Every section's length adds up to the total after the AID
        assert_eq!(
            reply.len(),
            1 + 0x0e + 0x17 + 0x08 + 0x1b + 0x26 + 0x0f + 0x07 + 0x0c + 0x12 + 0x11
        );
    }

    #[test]
    fn test_query_reply_model_4_geometry() {
        let reply = query_reply(TerminalModel::Model4);
        assert_eq!(&reply[21..25], &[0x00, 0x50, 0x00, 0x2b]);
        assert_eq!(&reply[reply.len() - 4..], &[0x00, 0x50, 0x00, 0x2b]);
    }
}
