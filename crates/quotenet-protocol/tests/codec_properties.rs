//! Property tests for the quote codec.
//!
//! - Any quote survives an encode/decode cycle unchanged.
//! - Arbitrary bytes never panic the decoder, and a failed decode does
//!   not change the outcome of the next one.

use proptest::prelude::*;

use quotenet_protocol::codec::{decode, encode};
use quotenet_protocol::quote::PriceQuote;

proptest! {
    #[test]
    fn decode_inverts_encode(pair in ".*", price in ".*") {
        let quote = PriceQuote::new(pair, price);
        let bytes = encode(&quote).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), quote);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&bytes);
    }

    #[test]
    fn malformed_input_does_not_poison_later_decodes(
        junk in proptest::collection::vec(any::<u8>(), 0..64),
        pair in "[A-Z]{3}/[A-Z]{3}",
        price in "[0-9]{1,6}\\.[0-9]{1,4}",
    ) {
        let quote = PriceQuote::new(pair, price);
        let good = encode(&quote).unwrap();

        let before = decode(&good).unwrap();
        let _ = decode(&junk);
        let after = decode(&good).unwrap();

        prop_assert_eq!(&before, &quote);
        prop_assert_eq!(after, quote);
    }
}

#[test]
fn truncated_payload_is_an_error_not_a_panic() {
    let good = encode(&PriceQuote::new("SOL/USD", "150.2")).unwrap();
    for cut in 0..good.len() {
        assert!(decode(&good[..cut]).is_err(), "prefix of length {cut} decoded");
    }
}
