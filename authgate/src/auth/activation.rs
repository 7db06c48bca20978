//! Account activation envelopes.
//!
//! The activation email carries one opaque string, `base64("<id>@<code>")`,
//! so the client submits a single value and the server recovers both the
//! account and the code to compare against the stored one.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{codes::generate_code, errors::Error, types::UserId};

/// Build the envelope sent in the activation email.
pub fn encode_envelope(id: UserId, code: &str) -> String {
    BASE64.encode(format!("{id}@{code}"))
}

/// Recover (id, code) from a submitted envelope. Any malformation is the same
/// client error; the caller still has to compare the code against the stored
/// one.
pub fn decode_envelope(envelope: &str) -> Result<(UserId, String), Error> {
    let decoded = BASE64.decode(envelope.trim()).map_err(|_| Error::InvalidActivationCode)?;
    let text = String::from_utf8(decoded).map_err(|_| Error::InvalidActivationCode)?;

    let (id, code) = text.split_once('@').ok_or(Error::InvalidActivationCode)?;
    let id: UserId = id.parse().map_err(|_| Error::InvalidActivationCode)?;
    if code.is_empty() {
        return Err(Error::InvalidActivationCode);
    }
    Ok((id, code.to_string()))
}

/// Fresh activation code for a new or re-sent activation email.
pub fn new_activation_code() -> String {
    generate_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = encode_envelope(10042, "937261");
        let (id, code) = decode_envelope(&envelope).unwrap();
        assert_eq!(id, 10042);
        assert_eq!(code, "937261");
    }

    #[test]
    fn test_malformed_envelopes_rejected() {
        for bad in [
            "",
            "not base64 ~~~",
            &base64::engine::general_purpose::STANDARD.encode("no-separator"),
            &base64::engine::general_purpose::STANDARD.encode("abc@123"),
            &base64::engine::general_purpose::STANDARD.encode("10042@"),
            &base64::engine::general_purpose::STANDARD.encode("@123456"),
        ] {
            assert!(
                matches!(decode_envelope(bad).unwrap_err(), Error::InvalidActivationCode),
                "expected InvalidActivationCode for {bad:?}"
            );
        }
    }
}
