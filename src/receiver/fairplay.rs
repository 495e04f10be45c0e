//! FairPlay v3 setup envelope
//!
//! `POST /fp-setup` carries `FPLY`-framed messages. Only version 3 is
//! accepted (v4+ and `/fp-setup2` are answered with 421). The handshake
//! has two phases: a short mode negotiation and a longer key message
//! whose reply echoes the trailing 20 bytes under a fixed header. The
//! content-protection ciphers themselves live outside this crate.

use super::dispatcher::HandlerError;
use crate::protocol::http::StatusCode;

const FPLY_MAGIC: &[u8; 4] = b"FPLY";
const SUPPORTED_VERSION: u8 = 3;

/// Phase-1 reply length
const PHASE1_REPLY_LEN: usize = 142;
/// Keymsg tail echoed in the phase-2 reply
const KEYMSG_TAIL: usize = 20;
/// Header of the phase-2 reply
const PHASE2_HEADER: [u8; 12] = [
    0x46, 0x50, 0x4C, 0x59, 0x03, 0x01, 0x04, 0x00, 0x00, 0x00, 0x00, 0x14,
];

/// Per-connection FairPlay handshake state
#[derive(Default)]
pub(crate) struct FairPlaySession {
    mode: Option<u8>,
}

impl FairPlaySession {
    /// Handle one `/fp-setup` message and produce the reply body
    pub(crate) fn setup(&mut self, body: &[u8]) -> Result<Vec<u8>, HandlerError> {
        if body.len() < 7 || &body[0..4] != FPLY_MAGIC {
            return Err(HandlerError::BadRequest("malformed fp-setup message".into()));
        }

        let version = body[4];
        if version != SUPPORTED_VERSION {
            return Err(HandlerError::Unsupported {
                status: StatusCode::MISDIRECTED_REQUEST,
                detail: format!(
                    "only FairPlay version 0x03 is implemented, version is 0x{version:02x}"
                ),
            });
        }

        let seq = body[6];
        match seq {
            1 => {
                // Mode negotiation; remember the requested mode and
                // answer with the sequence-2 frame
                let mode = body.get(14).copied().unwrap_or(0);
                self.mode = Some(mode);
                tracing::debug!(mode, "fp-setup phase 1");

                let mut reply = vec![0u8; PHASE1_REPLY_LEN];
                reply[0..4].copy_from_slice(FPLY_MAGIC);
                reply[4] = SUPPORTED_VERSION;
                reply[5] = 0x01;
                reply[6] = 0x02;
                reply[7] = mode;
                Ok(reply)
            }
            3 => {
                if body.len() < KEYMSG_TAIL {
                    return Err(HandlerError::BadRequest("fp-setup keymsg too short".into()));
                }
                tracing::debug!(len = body.len(), "fp-setup phase 2");

                let mut reply = Vec::with_capacity(PHASE2_HEADER.len() + KEYMSG_TAIL);
                reply.extend_from_slice(&PHASE2_HEADER);
                reply.extend_from_slice(&body[body.len() - KEYMSG_TAIL..]);
                Ok(reply)
            }
            other => Err(HandlerError::BadRequest(format!(
                "unexpected fp-setup sequence {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase1_message(mode: u8) -> Vec<u8> {
        let mut message = vec![0u8; 16];
        message[0..4].copy_from_slice(b"FPLY");
        message[4] = 3;
        message[5] = 1;
        message[6] = 1;
        message[14] = mode;
        message
    }

    #[test]
    fn test_phase1_reply_shape() {
        let mut session = FairPlaySession::default();
        let reply = session.setup(&phase1_message(2)).unwrap();

        assert_eq!(reply.len(), 142);
        assert_eq!(&reply[0..4], b"FPLY");
        assert_eq!(reply[6], 2);
        assert_eq!(reply[7], 2);
    }

    #[test]
    fn test_phase2_echoes_keymsg_tail() {
        let mut session = FairPlaySession::default();
        let _ = session.setup(&phase1_message(0)).unwrap();

        let mut keymsg = vec![0u8; 164];
        keymsg[0..4].copy_from_slice(b"FPLY");
        keymsg[4] = 3;
        keymsg[6] = 3;
        for (i, byte) in keymsg[144..].iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            {
                *byte = i as u8;
            }
        }

        let reply = session.setup(&keymsg).unwrap();
        assert_eq!(reply.len(), 32);
        assert_eq!(&reply[0..12], &super::PHASE2_HEADER);
        assert_eq!(&reply[12..], &keymsg[144..]);
    }

    #[test]
    fn test_version_4_rejected() {
        let mut session = FairPlaySession::default();
        let mut message = phase1_message(0);
        message[4] = 4;

        assert!(matches!(
            session.setup(&message),
            Err(HandlerError::Unsupported { status, .. })
                if status == StatusCode::MISDIRECTED_REQUEST
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        let mut session = FairPlaySession::default();
        assert!(session.setup(b"nope").is_err());
    }
}
