//! JSON codec for [`PriceQuote`] payloads.
//!
//! Decoding is strict about shape (both fields must be present and be
//! strings) but tolerant of unknown extra fields, matching a plain
//! JSON object decode. Every failure is reported as
//! `QuotenetError::ProtocolError`; the codec holds no state, so a bad
//! payload never affects later calls.

use quotenet_types::{QuotenetError, Result};

use crate::quote::PriceQuote;

/// Serializes a quote to its JSON wire form.
///
/// # Errors
///
/// Returns `QuotenetError::ProtocolError` if serialization fails. With
/// two string fields this does not happen in practice, but the error is
/// surfaced rather than unwrapped.
pub fn encode(quote: &PriceQuote) -> Result<Vec<u8>> {
    serde_json::to_vec(quote).map_err(|e| QuotenetError::ProtocolError {
        reason: format!("failed to encode quote: {e}"),
    })
}

/// Deserializes a quote from JSON bytes.
///
/// # Errors
///
/// Returns `QuotenetError::ProtocolError` for invalid UTF-8, invalid
/// JSON, a non-object value, or missing/non-string fields.
pub fn decode(bytes: &[u8]) -> Result<PriceQuote> {
    serde_json::from_slice(bytes).map_err(|e| QuotenetError::ProtocolError {
        reason: format!("failed to decode quote: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_wire_field_names() {
        let bytes = encode(&PriceQuote::new("BTC/USDT", "64000")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"pair":"BTC/USDT","price":"64000"}"#);
    }

    #[test]
    fn decodes_payload_from_other_implementations() {
        let quote = decode(br#"{ "price": "1.07", "pair": "EUR/USD" }"#).unwrap();
        assert_eq!(quote, PriceQuote::new("EUR/USD", "1.07"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let quote = decode(br#"{"pair":"a","price":"b","venue":"x"}"#).unwrap();
        assert_eq!(quote, PriceQuote::new("a", "b"));
    }

    #[test]
    fn numeric_price_is_rejected() {
        let err = decode(br#"{"pair":"a","price":1.5}"#).unwrap_err();
        assert!(matches!(err, QuotenetError::ProtocolError { .. }));
    }

    #[test]
    fn missing_field_is_rejected() {
        assert!(decode(br#"{"pair":"a"}"#).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"\xff\xfe not json").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(b"[]").is_err());
    }
}
