//! RFC 2617 HTTP digest authentication (MD5)
//!
//! Used when the receiver is configured with an access password. Both
//! `qop=auth` and the legacy form are accepted. Token extraction scans
//! the `Authorization` header for each key, then takes the value between
//! the next delimiter pair.

use rand::RngCore;

/// Build the `WWW-Authenticate` challenge value for a 401 response
#[must_use]
pub fn challenge(realm: &str, nonce: &str) -> String {
    format!("Digest realm=\"{realm}\", nonce=\"{nonce}\"")
}

/// Fresh server nonce (hex MD5 of random bytes)
#[must_use]
pub fn make_nonce() -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    format!("{:x}", md5::compute(raw))
}

/// Verify a digest `Authorization` header against the method and
/// password. `expected_nonce`, when given, must match the nonce the
/// client echoes back.
#[must_use]
pub fn verify(
    method: &str,
    authorization: &str,
    password: &str,
    expected_nonce: Option<&str>,
) -> bool {
    let mut cursor = authorization;

    let Some(username) = token(&mut cursor, "username", '"', '"') else {
        return false;
    };
    let Some(realm) = token(&mut cursor, "realm", '"', '"') else {
        return false;
    };
    let Some(nonce) = token(&mut cursor, "nonce", '"', '"') else {
        return false;
    };
    let Some(uri) = token(&mut cursor, "uri", '"', '"') else {
        return false;
    };

    let qop = token(&mut cursor, "qop", '=', ',');
    let (nc, cnonce) = if qop.is_some() {
        let Some(nc) = token(&mut cursor, "nc", '=', ',') else {
            return false;
        };
        let Some(cnonce) = token(&mut cursor, "cnonce", '"', '"') else {
            return false;
        };
        (Some(nc), Some(cnonce))
    } else {
        (None, None)
    };

    let Some(response) = token(&mut cursor, "response", '"', '"') else {
        return false;
    };

    if let Some(expected) = expected_nonce {
        if nonce != expected {
            return false;
        }
    }

    // H1 = H(username:realm:password), H2 = H(method:uri)
    let h1 = md5_hex(&format!("{username}:{realm}:{password}"));
    let h2 = md5_hex(&format!("{method}:{uri}"));

    let expected = match (qop, nc, cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => {
            md5_hex(&format!("{h1}:{nonce}:{nc}:{cnonce}:{qop}:{h2}"))
        }
        _ => md5_hex(&format!("{h1}:{nonce}:{h2}")),
    };

    constant_time_eq(expected.as_bytes(), response.as_bytes())
}

/// Find `key` from the cursor position, then return the text between
/// the next `start`/`end` delimiter pair, advancing the cursor past it.
fn token<'a>(cursor: &mut &'a str, key: &str, start: char, end: char) -> Option<&'a str> {
    let rest = *cursor;
    let key_at = rest.find(key)?;
    let after_key = &rest[key_at + key.len()..];

    let start_at = after_key.find(start)?;
    let value_and_rest = &after_key[start_at + start.len_utf8()..];
    let end_at = value_and_rest.find(end)?;

    *cursor = &value_and_rest[end_at + end.len_utf8()..];
    Some(&value_and_rest[..end_at])
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worked example from RFC 2617 §3.5
    const RFC2617_AUTH: &str = concat!(
        "Digest username=\"Mufasa\",",
        "realm=\"testrealm@host.com\",",
        "nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\",",
        "uri=\"/dir/index.html\",",
        "qop=auth,",
        "nc=00000001,",
        "cnonce=\"0a4f113b\",",
        "response=\"6629fae49393a05397450978507c4ef1\",",
        "opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""
    );

    #[test]
    fn test_rfc2617_vector() {
        assert!(verify("GET", RFC2617_AUTH, "Circle Of Life", None));
    }

    #[test]
    fn test_rfc2617_vector_with_nonce_check() {
        assert!(verify(
            "GET",
            RFC2617_AUTH,
            "Circle Of Life",
            Some("dcd98b7102dd2f0e8b11d0f600bfb0c093"),
        ));
        assert!(!verify(
            "GET",
            RFC2617_AUTH,
            "Circle Of Life",
            Some("someothernonce"),
        ));
    }

    #[test]
    fn test_wrong_password_rejected() {
        assert!(!verify("GET", RFC2617_AUTH, "Hakuna Matata", None));
    }

    #[test]
    fn test_wrong_method_rejected() {
        assert!(!verify("POST", RFC2617_AUTH, "Circle Of Life", None));
    }

    #[test]
    fn test_legacy_form_without_qop() {
        // Compute the expected legacy response and check it verifies
        let h1 = md5_hex("user:realm:pw");
        let h2 = md5_hex("GET:/index.html");
        let response = md5_hex(&format!("{h1}:abcdef:{h2}"));

        let auth = format!(
            "Digest username=\"user\",realm=\"realm\",nonce=\"abcdef\",\
             uri=\"/index.html\",response=\"{response}\""
        );
        assert!(verify("GET", &auth, "pw", None));
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(!verify("GET", "Digest username=\"a\"", "pw", None));
    }

    #[test]
    fn test_nonce_format() {
        let nonce = make_nonce();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
