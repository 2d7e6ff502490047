/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! RMCP envelope and IPMI session framing.
//!
//! Two inbound framings are accepted: the IPMI 1.5 session-less format
//! (only used by the pre-session Get Channel Authentication Capabilities
//! probe) and the IPMI 2.0 / RMCP+ format carrying a payload type, session
//! id, session sequence number and, once a session is established, an
//! integrity trailer.

use crate::IpmiError;
use crate::crypto::{self, AUTHCODE_LEN};

pub const RMCP_VERSION: u8 = 0x06;
pub const RMCP_SEQUENCE_NONE: u8 = 0xFF;
pub const RMCP_CLASS_IPMI: u8 = 0x07;

const AUTH_TYPE_NONE: u8 = 0x00;
const AUTH_TYPE_RMCP_PLUS: u8 = 0x06;

const PAYLOAD_ENCRYPTED: u8 = 0x80;
const PAYLOAD_AUTHENTICATED: u8 = 0x40;
const PAYLOAD_TYPE_MASK: u8 = 0x3F;

/// Header of every RMCP+ frame: RMCP(4) + auth type(1) + payload type(1) +
/// session id(4) + sequence(4) + length(2).
const PLUS_HEADER_LEN: usize = 16;
/// Integrity trailer tail: pad length(1) + next header(1) + authcode(12).
const TRAILER_TAIL_LEN: usize = 2 + AUTHCODE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    IpmiMessage,
    OpenSessionRequest,
    OpenSessionResponse,
    Rakp1,
    Rakp2,
    Rakp3,
    Rakp4,
}

impl PayloadType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(PayloadType::IpmiMessage),
            0x10 => Some(PayloadType::OpenSessionRequest),
            0x11 => Some(PayloadType::OpenSessionResponse),
            0x12 => Some(PayloadType::Rakp1),
            0x13 => Some(PayloadType::Rakp2),
            0x14 => Some(PayloadType::Rakp3),
            0x15 => Some(PayloadType::Rakp4),
            _ => None,
        }
    }

    pub fn wire_value(self) -> u8 {
        match self {
            PayloadType::IpmiMessage => 0x00,
            PayloadType::OpenSessionRequest => 0x10,
            PayloadType::OpenSessionResponse => 0x11,
            PayloadType::Rakp1 => 0x12,
            PayloadType::Rakp2 => 0x13,
            PayloadType::Rakp3 => 0x14,
            PayloadType::Rakp4 => 0x15,
        }
    }
}

#[derive(Debug)]
pub enum InboundFrame {
    /// IPMI 1.5 session-less frame; payload is a plain LAN message.
    Legacy { payload: Vec<u8> },
    /// IPMI 2.0 / RMCP+ frame.
    Plus(PlusFrame),
}

#[derive(Debug)]
pub struct PlusFrame {
    pub payload_type: PayloadType,
    pub encrypted: bool,
    pub authenticated: bool,
    pub session_id: u32,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

/// Parse one datagram. Non-IPMI RMCP classes (e.g. ASF presence ping) are
/// rejected here and dropped by the caller.
pub fn parse_frame(datagram: &[u8]) -> Result<InboundFrame, IpmiError> {
    if datagram.len() < 5 {
        return Err(IpmiError::Malformed("datagram shorter than RMCP header"));
    }
    if datagram[0] != RMCP_VERSION {
        return Err(IpmiError::Malformed("bad RMCP version"));
    }
    if datagram[3] != RMCP_CLASS_IPMI {
        return Err(IpmiError::Malformed("non-IPMI RMCP class"));
    }

    match datagram[4] {
        AUTH_TYPE_NONE => parse_legacy(datagram),
        AUTH_TYPE_RMCP_PLUS => parse_plus(datagram),
        _ => Err(IpmiError::Malformed("unsupported IPMI auth type")),
    }
}

fn parse_legacy(datagram: &[u8]) -> Result<InboundFrame, IpmiError> {
    // auth(1) + seq(4) + session id(4) + length(1)
    if datagram.len() < 14 {
        return Err(IpmiError::Malformed("short IPMI 1.5 header"));
    }
    let length = datagram[13] as usize;
    let payload = datagram[14..]
        .get(..length)
        .ok_or(IpmiError::Malformed("IPMI 1.5 length exceeds datagram"))?;
    Ok(InboundFrame::Legacy {
        payload: payload.to_vec(),
    })
}

fn parse_plus(datagram: &[u8]) -> Result<InboundFrame, IpmiError> {
    if datagram.len() < PLUS_HEADER_LEN {
        return Err(IpmiError::Malformed("short RMCP+ header"));
    }
    let type_byte = datagram[5];
    let payload_type = PayloadType::from_wire(type_byte & PAYLOAD_TYPE_MASK)
        .ok_or(IpmiError::Malformed("unsupported payload type"))?;
    let session_id = u32::from_le_bytes([datagram[6], datagram[7], datagram[8], datagram[9]]);
    let sequence = u32::from_le_bytes([datagram[10], datagram[11], datagram[12], datagram[13]]);
    let length = u16::from_le_bytes([datagram[14], datagram[15]]) as usize;
    let payload = datagram[PLUS_HEADER_LEN..]
        .get(..length)
        .ok_or(IpmiError::Malformed("RMCP+ length exceeds datagram"))?;
    Ok(InboundFrame::Plus(PlusFrame {
        payload_type,
        encrypted: type_byte & PAYLOAD_ENCRYPTED != 0,
        authenticated: type_byte & PAYLOAD_AUTHENTICATED != 0,
        session_id,
        sequence,
        payload: payload.to_vec(),
    }))
}

/// Verify the HMAC-SHA1-96 integrity trailer of an authenticated frame.
/// The code covers everything from the auth-type byte through the
/// next-header byte, i.e. the whole datagram minus the RMCP header and the
/// 12 trailing authcode bytes.
pub fn verify_authcode(datagram: &[u8], k1: &[u8; crypto::SHA1_LEN]) -> Result<(), IpmiError> {
    if datagram.len() < PLUS_HEADER_LEN + TRAILER_TAIL_LEN {
        return Err(IpmiError::AuthRejected("frame too short for authcode"));
    }
    let split = datagram.len() - AUTHCODE_LEN;
    let expected = crypto::hmac_sha1_96(k1, &datagram[4..split]);
    if expected[..] == datagram[split..] {
        Ok(())
    } else {
        Err(IpmiError::AuthRejected("authcode mismatch"))
    }
}

/// Build an RMCP+ frame. `keys` supplies (K1, K2) once the session is
/// established; K2 is only used when `encrypt` is set.
pub fn build_plus_frame(
    payload_type: PayloadType,
    session_id: u32,
    sequence: u32,
    payload: &[u8],
    keys: Option<(&[u8; crypto::SHA1_LEN], &[u8; crypto::SHA1_LEN])>,
    encrypt: bool,
) -> Vec<u8> {
    let body = if encrypt {
        let (_, k2) = keys.expect("BUG: encryption requested without session keys");
        crypto::aes_cbc_encrypt(k2, payload)
    } else {
        payload.to_vec()
    };

    let mut type_byte = payload_type.wire_value();
    if keys.is_some() {
        type_byte |= PAYLOAD_AUTHENTICATED;
    }
    if encrypt {
        type_byte |= PAYLOAD_ENCRYPTED;
    }

    let mut frame = Vec::with_capacity(PLUS_HEADER_LEN + body.len() + TRAILER_TAIL_LEN + 2);
    frame.extend_from_slice(&[
        RMCP_VERSION,
        0x00,
        RMCP_SEQUENCE_NONE,
        RMCP_CLASS_IPMI,
        AUTH_TYPE_RMCP_PLUS,
        type_byte,
    ]);
    frame.extend_from_slice(&session_id.to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u16).to_le_bytes());
    frame.extend_from_slice(&body);

    if let Some((k1, _)) = keys {
        // Pad so payload + pad + pad-length + next-header is 4-aligned.
        let pad_len = (4 - ((body.len() + 2) % 4)) % 4;
        for _ in 0..pad_len {
            frame.push(0xFF);
        }
        frame.push(pad_len as u8);
        frame.push(RMCP_CLASS_IPMI);
        let authcode = crypto::hmac_sha1_96(k1, &frame[4..]);
        frame.extend_from_slice(&authcode);
    }
    frame
}

/// Build an IPMI 1.5 session-less frame (pre-session responses only).
pub fn build_legacy_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&[
        RMCP_VERSION,
        0x00,
        RMCP_SEQUENCE_NONE,
        RMCP_CLASS_IPMI,
        AUTH_TYPE_NONE,
    ]);
    frame.extend_from_slice(&[0u8; 8]); // sequence + session id, both zero
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_ipmi_class() {
        // An ASF presence ping carries class 0x06.
        let ping = [0x06, 0x00, 0xFF, 0x06, 0x00, 0x00, 0x11, 0xBE];
        assert!(matches!(
            parse_frame(&ping),
            Err(IpmiError::Malformed("non-IPMI RMCP class"))
        ));
    }

    #[test]
    fn legacy_frame_round_trips() {
        let payload = [0x20, 0x18, 0xC8, 0x81, 0x04, 0x38, 0x0E, 0x04, 0x31];
        let frame = build_legacy_frame(&payload);
        match parse_frame(&frame).expect("parse") {
            InboundFrame::Legacy { payload: parsed } => assert_eq!(parsed, payload),
            other => panic!("expected legacy frame, got {other:?}"),
        }
    }

    #[test]
    fn unauthenticated_plus_frame_round_trips() {
        let payload = vec![0xAA; 17];
        let frame = build_plus_frame(
            PayloadType::OpenSessionResponse,
            0,
            0,
            &payload,
            None,
            false,
        );
        match parse_frame(&frame).expect("parse") {
            InboundFrame::Plus(plus) => {
                assert_eq!(plus.payload_type, PayloadType::OpenSessionResponse);
                assert!(!plus.authenticated);
                assert!(!plus.encrypted);
                assert_eq!(plus.session_id, 0);
                assert_eq!(plus.payload, payload);
            }
            other => panic!("expected RMCP+ frame, got {other:?}"),
        }
    }

    #[test]
    fn authenticated_frame_verifies_and_detects_tampering() {
        let k1 = [0x11u8; crypto::SHA1_LEN];
        let k2 = [0x22u8; crypto::SHA1_LEN];
        let payload = vec![1, 2, 3, 4, 5];
        let mut frame = build_plus_frame(
            PayloadType::IpmiMessage,
            0x0A0B0C0D,
            7,
            &payload,
            Some((&k1, &k2)),
            false,
        );

        verify_authcode(&frame, &k1).expect("authcode should verify");

        match parse_frame(&frame).expect("parse") {
            InboundFrame::Plus(plus) => {
                assert!(plus.authenticated);
                assert_eq!(plus.sequence, 7);
                assert_eq!(plus.payload, payload);
            }
            other => panic!("expected RMCP+ frame, got {other:?}"),
        }

        // Flip one payload byte: the authcode must fail.
        frame[17] ^= 0xFF;
        assert!(verify_authcode(&frame, &k1).is_err());
    }

    #[test]
    fn encrypted_frame_round_trips_through_keys() {
        let k1 = [0x33u8; crypto::SHA1_LEN];
        let k2 = [0x44u8; crypto::SHA1_LEN];
        let payload = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let frame = build_plus_frame(
            PayloadType::IpmiMessage,
            1,
            2,
            &payload,
            Some((&k1, &k2)),
            true,
        );
        verify_authcode(&frame, &k1).expect("authcode should verify");
        let InboundFrame::Plus(plus) = parse_frame(&frame).expect("parse") else {
            panic!("expected RMCP+ frame");
        };
        assert!(plus.encrypted);
        let decrypted = crypto::aes_cbc_decrypt(&k2, &plus.payload).expect("decrypt");
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn truncated_frames_are_malformed() {
        assert!(parse_frame(&[0x06, 0x00]).is_err());
        let mut frame = build_plus_frame(PayloadType::Rakp1, 0, 0, &[1, 2, 3], None, false);
        frame.truncate(frame.len() - 2);
        assert!(parse_frame(&frame).is_err());
    }
}
