//! Property tests for 3270 buffer addressing

use proptest::prelude::*;
use tn3270r::lib3270::{decode_address, encode_address, TerminalModel};

fn model() -> impl Strategy<Value = TerminalModel> {
    prop_oneof![
        Just(TerminalModel::Model2),
        Just(TerminalModel::Model3),
        Just(TerminalModel::Model4),
        Just(TerminalModel::Model5),
    ]
}

proptest! {
    #[test]
    fn address_round_trip(model in model(), seed in any::<u16>()) {
        let address = seed % model.buffer_size() as u16;
        let [b1, b2] = encode_address(address);
        prop_assert_eq!(decode_address(b1, b2), address);
    }

    #[test]
    fn add_wraps_modulo_screen_size(model in model(), seed in any::<u16>(), amount in -10_000i32..10_000) {
        let size = model.buffer_size() as i32;
        let address = seed % size as u16;
        let expected = (address as i32 + amount).rem_euclid(size) as u16;
        prop_assert_eq!(model.add_to_address(amount, address), expected);
        prop_assert_eq!(model.subtract_from_address(-amount, address), expected);
    }

    #[test]
    fn row_col_round_trip(model in model(), seed in any::<u16>()) {
        let address = seed % model.buffer_size() as u16;
        let (row, col) = model.address_to_row_col(address);
        prop_assert!(row < model.rows());
        prop_assert!(col < model.cols());
        prop_assert_eq!(model.row_col_to_address(row, col), address);
    }

    #[test]
    fn distance_then_add_returns_target(model in model(), a in any::<u16>(), b in any::<u16>()) {
        let size = model.buffer_size() as u16;
        let (from, to) = (a % size, b % size);
        let distance = model.distance(from, to);
        prop_assert!(distance < model.buffer_size());
        prop_assert_eq!(model.add_to_address(distance as i32, from), to);
    }
}

#[test]
fn fourteen_bit_binary_addresses_decode() {
    // Top two bits clear means a plain 14-bit binary address
    assert_eq!(decode_address(0x0D, 0xEB), 3563);
    assert_eq!(decode_address(0x00, 0x00), 0);
}
