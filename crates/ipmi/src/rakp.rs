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

//! RMCP+ Open Session and RAKP message 1–4 handling.

use std::net::SocketAddr;

use vbmc_config::VmConfig;

use crate::crypto;
use crate::rmcp::PayloadType;
use crate::session::{ConfidentialityAlgorithm, SessionPhase, SessionTable};

// RMCP+ status codes (IPMI 2.0 table 13-15), narrowed to the ones we emit.
pub mod status {
    pub const NO_ERRORS: u8 = 0x00;
    pub const INVALID_SESSION_ID: u8 = 0x02;
    pub const INVALID_AUTH_ALGORITHM: u8 = 0x04;
    pub const INVALID_INTEGRITY_ALGORITHM: u8 = 0x05;
    pub const UNAUTHORIZED_NAME: u8 = 0x0D;
    pub const INVALID_INTEGRITY_CHECK: u8 = 0x0F;
    pub const INVALID_CONFIDENTIALITY_ALGORITHM: u8 = 0x10;
}

const AUTH_RAKP_HMAC_SHA1: u8 = 0x01;
const INTEGRITY_HMAC_SHA1_96: u8 = 0x01;
const CONF_NONE: u8 = 0x00;
const CONF_AES_CBC_128: u8 = 0x01;

/// What the engine sends back for a session-establishment payload.
pub enum RakpReply {
    Send {
        payload_type: PayloadType,
        payload: Vec<u8>,
    },
    Drop,
}

fn algorithm_record(payload_type: u8, algorithm: u8) -> [u8; 8] {
    [payload_type, 0x00, 0x00, 0x08, algorithm, 0x00, 0x00, 0x00]
}

/// Parse one 8-byte algorithm proposal record; returns (type, algorithm).
fn parse_record(record: &[u8]) -> Option<(u8, u8)> {
    if record.len() < 8 || record[3] != 0x08 {
        return None;
    }
    Some((record[0], record[4]))
}

fn error_open_session_response(tag: u8, status: u8, console_session_id: u32) -> RakpReply {
    let mut payload = vec![tag, status, 0x00, 0x00];
    payload.extend_from_slice(&console_session_id.to_le_bytes());
    RakpReply::Send {
        payload_type: PayloadType::OpenSessionResponse,
        payload,
    }
}

/// Open Session Request: allocate a session and echo the negotiated
/// algorithms. Only RAKP-HMAC-SHA1 / HMAC-SHA1-96 / {none, AES-CBC-128}
/// are offered by this BMC.
pub fn handle_open_session(
    table: &SessionTable,
    remote: SocketAddr,
    payload: &[u8],
) -> RakpReply {
    if payload.len() < 32 {
        return RakpReply::Drop;
    }
    let tag = payload[0];
    let requested_privilege = payload[1];
    let console_session_id = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    if console_session_id == 0 {
        return error_open_session_response(tag, status::INVALID_SESSION_ID, console_session_id);
    }

    let mut auth_alg = None;
    let mut integrity_alg = None;
    let mut confidentiality_alg = None;
    for record in payload[8..].chunks(8) {
        match parse_record(record) {
            Some((0x00, alg)) => auth_alg = Some(alg),
            Some((0x01, alg)) => integrity_alg = Some(alg),
            Some((0x02, alg)) => confidentiality_alg = Some(alg),
            _ => {}
        }
    }

    if auth_alg != Some(AUTH_RAKP_HMAC_SHA1) {
        return error_open_session_response(tag, status::INVALID_AUTH_ALGORITHM, console_session_id);
    }
    if integrity_alg != Some(INTEGRITY_HMAC_SHA1_96) {
        return error_open_session_response(
            tag,
            status::INVALID_INTEGRITY_ALGORITHM,
            console_session_id,
        );
    }
    let confidentiality = match confidentiality_alg {
        Some(CONF_NONE) => ConfidentialityAlgorithm::None,
        Some(CONF_AES_CBC_128) => ConfidentialityAlgorithm::AesCbc128,
        _ => {
            return error_open_session_response(
                tag,
                status::INVALID_CONFIDENTIALITY_ALGORITHM,
                console_session_id,
            );
        }
    };

    let managed_session_id = table.open(remote, console_session_id);
    table.with_session(managed_session_id, remote, |session| {
        session.confidentiality = confidentiality;
        session.touch();
    });

    let conf_wire = match confidentiality {
        ConfidentialityAlgorithm::None => CONF_NONE,
        ConfidentialityAlgorithm::AesCbc128 => CONF_AES_CBC_128,
    };
    let mut response = vec![tag, status::NO_ERRORS, requested_privilege, 0x00];
    response.extend_from_slice(&console_session_id.to_le_bytes());
    response.extend_from_slice(&managed_session_id.to_le_bytes());
    response.extend_from_slice(&algorithm_record(0x00, AUTH_RAKP_HMAC_SHA1));
    response.extend_from_slice(&algorithm_record(0x01, INTEGRITY_HMAC_SHA1_96));
    response.extend_from_slice(&algorithm_record(0x02, conf_wire));
    RakpReply::Send {
        payload_type: PayloadType::OpenSessionResponse,
        payload: response,
    }
}

fn rakp_error(payload_type: PayloadType, tag: u8, status: u8, session_id: u32) -> RakpReply {
    let mut payload = vec![tag, status, 0x00, 0x00];
    payload.extend_from_slice(&session_id.to_le_bytes());
    RakpReply::Send {
        payload_type,
        payload,
    }
}

/// RAKP Message 1: verify the username, generate the managed random and
/// answer with RAKP2. An unknown user is rejected here with Unauthorized
/// Name and the pending session is dropped.
pub fn handle_rakp1(
    table: &SessionTable,
    remote: SocketAddr,
    payload: &[u8],
    vm: &VmConfig,
) -> RakpReply {
    if payload.len() < 28 {
        return RakpReply::Drop;
    }
    let tag = payload[0];
    let managed_session_id = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let mut rand_console = [0u8; 16];
    rand_console.copy_from_slice(&payload[8..24]);
    let role = payload[24];
    let username_len = payload[27] as usize;
    let Some(username) = payload.get(28..28 + username_len) else {
        return RakpReply::Drop;
    };

    let console_session_id = match table.with_session(managed_session_id, remote, |session| {
        session.console_session_id
    }) {
        Some(id) => id,
        None => return rakp_error(PayloadType::Rakp2, tag, status::INVALID_SESSION_ID, 0),
    };

    if username != vm.ipmi_user.as_bytes() {
        tracing::info!(vm = %vm.name, "rejecting IPMI session for unknown user");
        table.remove(managed_session_id);
        return rakp_error(
            PayloadType::Rakp2,
            tag,
            status::UNAUTHORIZED_NAME,
            console_session_id,
        );
    }

    let mut rand_managed = [0u8; 16];
    rand::fill(&mut rand_managed);
    let guid = crypto::managed_guid(&vm.name);

    table.with_session(managed_session_id, remote, |session| {
        session.rand_console = rand_console;
        session.rand_managed = rand_managed;
        session.role = role;
        session.username = username.to_vec();
        session.phase = SessionPhase::Rakp2Sent;
        session.touch();
    });

    let authcode = crypto::rakp2_authcode(
        vm.ipmi_password.as_bytes(),
        console_session_id,
        managed_session_id,
        &rand_console,
        &rand_managed,
        &guid,
        role,
        username,
    );

    let mut response = vec![tag, status::NO_ERRORS, 0x00, 0x00];
    response.extend_from_slice(&console_session_id.to_le_bytes());
    response.extend_from_slice(&rand_managed);
    response.extend_from_slice(&guid);
    response.extend_from_slice(&authcode);
    RakpReply::Send {
        payload_type: PayloadType::Rakp2,
        payload: response,
    }
}

/// RAKP Message 3: verify the console's key-exchange code, derive the
/// session keys and answer with RAKP4.
pub fn handle_rakp3(
    table: &SessionTable,
    remote: SocketAddr,
    payload: &[u8],
    vm: &VmConfig,
) -> RakpReply {
    if payload.len() < 8 {
        return RakpReply::Drop;
    }
    let tag = payload[0];
    let console_status = payload[1];
    let managed_session_id = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);

    let Some((console_session_id, rand_console, rand_managed, role, username)) = table
        .with_session(managed_session_id, remote, |session| {
            (
                session.console_session_id,
                session.rand_console,
                session.rand_managed,
                session.role,
                session.username.clone(),
            )
        })
    else {
        return rakp_error(PayloadType::Rakp4, tag, status::INVALID_SESSION_ID, 0);
    };

    if console_status != status::NO_ERRORS {
        // The console aborted the handshake after RAKP2.
        table.remove(managed_session_id);
        return RakpReply::Drop;
    }

    let expected = crypto::rakp3_authcode(
        vm.ipmi_password.as_bytes(),
        &rand_managed,
        console_session_id,
        role,
        &username,
    );
    if payload[8..] != expected[..] {
        tracing::info!(vm = %vm.name, "RAKP3 integrity check failed");
        table.remove(managed_session_id);
        return rakp_error(
            PayloadType::Rakp4,
            tag,
            status::INVALID_INTEGRITY_CHECK,
            console_session_id,
        );
    }

    let sik = crypto::derive_sik(
        vm.ipmi_password.as_bytes(),
        &rand_console,
        &rand_managed,
        role,
        &username,
    );
    let k1 = crypto::derive_k(&sik, 0x01);
    let k2 = crypto::derive_k(&sik, 0x02);
    table.with_session(managed_session_id, remote, |session| {
        session.sik = sik;
        session.k1 = k1;
        session.k2 = k2;
        session.phase = SessionPhase::Rakp4Sent;
        session.touch();
    });

    let guid = crypto::managed_guid(&vm.name);
    let icv = crypto::rakp4_icv(&sik, &rand_console, managed_session_id, &guid);
    let mut response = vec![tag, status::NO_ERRORS, 0x00, 0x00];
    response.extend_from_slice(&console_session_id.to_le_bytes());
    response.extend_from_slice(&icv);
    RakpReply::Send {
        payload_type: PayloadType::Rakp4,
        payload: response,
    }
}

#[cfg(test)]
mod tests {
    use vbmc_config::Config;

    use super::*;

    fn vm_config() -> VmConfig {
        Config::example().vms[0].clone()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().expect("valid addr")
    }

    fn open_session_payload(console_id: u32, conf_alg: u8) -> Vec<u8> {
        let mut payload = vec![0x01, 0x04, 0x00, 0x00];
        payload.extend_from_slice(&console_id.to_le_bytes());
        payload.extend_from_slice(&algorithm_record(0x00, AUTH_RAKP_HMAC_SHA1));
        payload.extend_from_slice(&algorithm_record(0x01, INTEGRITY_HMAC_SHA1_96));
        payload.extend_from_slice(&algorithm_record(0x02, conf_alg));
        payload
    }

    fn open(table: &SessionTable, conf_alg: u8) -> u32 {
        let reply = handle_open_session(table, addr(), &open_session_payload(0xCAFEBABE, conf_alg));
        let RakpReply::Send { payload, .. } = reply else {
            panic!("expected open session response");
        };
        assert_eq!(payload[1], status::NO_ERRORS);
        u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]])
    }

    fn rakp1_payload(managed_id: u32, username: &[u8]) -> Vec<u8> {
        let mut payload = vec![0x02, 0x00, 0x00, 0x00];
        payload.extend_from_slice(&managed_id.to_le_bytes());
        payload.extend_from_slice(&[0xAB; 16]);
        payload.push(0x04);
        payload.extend_from_slice(&[0x00, 0x00]);
        payload.push(username.len() as u8);
        payload.extend_from_slice(username);
        payload
    }

    #[test]
    fn open_session_negotiates_supported_algorithms() {
        let table = SessionTable::new();
        let managed_id = open(&table, CONF_AES_CBC_128);
        assert_ne!(managed_id, 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn open_session_rejects_unknown_cipher() {
        let table = SessionTable::new();
        let reply =
            handle_open_session(&table, addr(), &open_session_payload(0xCAFEBABE, 0x03));
        let RakpReply::Send { payload, .. } = reply else {
            panic!("expected error response");
        };
        assert_eq!(payload[1], status::INVALID_CONFIDENTIALITY_ALGORITHM);
        assert!(table.is_empty());
    }

    #[test]
    fn rakp1_unknown_user_is_rejected_and_session_dropped() {
        let table = SessionTable::new();
        let vm = vm_config();
        let managed_id = open(&table, CONF_NONE);

        let reply = handle_rakp1(&table, addr(), &rakp1_payload(managed_id, b"attacker"), &vm);
        let RakpReply::Send {
            payload_type,
            payload,
        } = reply
        else {
            panic!("expected RAKP2 error");
        };
        assert_eq!(payload_type, PayloadType::Rakp2);
        assert_eq!(payload[1], status::UNAUTHORIZED_NAME);
        assert!(table.is_empty(), "pending session must be removed");
    }

    #[test]
    fn full_rakp_exchange_derives_matching_keys() {
        let table = SessionTable::new();
        let vm = vm_config();
        let managed_id = open(&table, CONF_NONE);
        let password = vm.ipmi_password.as_bytes().to_vec();

        let reply = handle_rakp1(
            &table,
            addr(),
            &rakp1_payload(managed_id, vm.ipmi_user.as_bytes()),
            &vm,
        );
        let RakpReply::Send { payload, .. } = reply else {
            panic!("expected RAKP2");
        };
        assert_eq!(payload[1], status::NO_ERRORS);
        let mut rand_managed = [0u8; 16];
        rand_managed.copy_from_slice(&payload[8..24]);
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&payload[24..40]);

        // The console verifies RAKP2 with the same derivation.
        let expected_rakp2 = crypto::rakp2_authcode(
            &password,
            0xCAFEBABE,
            managed_id,
            &[0xAB; 16],
            &rand_managed,
            &guid,
            0x04,
            vm.ipmi_user.as_bytes(),
        );
        assert_eq!(&payload[40..], &expected_rakp2[..]);

        // Console sends RAKP3 with its key-exchange code.
        let rakp3_code = crypto::rakp3_authcode(
            &password,
            &rand_managed,
            0xCAFEBABE,
            0x04,
            vm.ipmi_user.as_bytes(),
        );
        let mut rakp3 = vec![0x03, 0x00, 0x00, 0x00];
        rakp3.extend_from_slice(&managed_id.to_le_bytes());
        rakp3.extend_from_slice(&rakp3_code);

        let reply = handle_rakp3(&table, addr(), &rakp3, &vm);
        let RakpReply::Send {
            payload_type,
            payload,
        } = reply
        else {
            panic!("expected RAKP4");
        };
        assert_eq!(payload_type, PayloadType::Rakp4);
        assert_eq!(payload[1], status::NO_ERRORS);

        // RAKP4 ICV must verify against the independently derived SIK.
        let sik = crypto::derive_sik(
            &password,
            &[0xAB; 16],
            &rand_managed,
            0x04,
            vm.ipmi_user.as_bytes(),
        );
        let expected_icv = crypto::rakp4_icv(&sik, &[0xAB; 16], managed_id, &guid);
        assert_eq!(&payload[8..], &expected_icv[..]);

        table
            .with_session(managed_id, addr(), |session| {
                assert_eq!(session.phase, SessionPhase::Rakp4Sent);
                assert_eq!(session.sik, sik);
            })
            .expect("session retained");
    }

    #[test]
    fn rakp3_with_bad_code_fails_integrity_check() {
        let table = SessionTable::new();
        let vm = vm_config();
        let managed_id = open(&table, CONF_NONE);
        handle_rakp1(
            &table,
            addr(),
            &rakp1_payload(managed_id, vm.ipmi_user.as_bytes()),
            &vm,
        );

        let mut rakp3 = vec![0x03, 0x00, 0x00, 0x00];
        rakp3.extend_from_slice(&managed_id.to_le_bytes());
        rakp3.extend_from_slice(&[0u8; 20]);
        let reply = handle_rakp3(&table, addr(), &rakp3, &vm);
        let RakpReply::Send { payload, .. } = reply else {
            panic!("expected RAKP4 error");
        };
        assert_eq!(payload[1], status::INVALID_INTEGRITY_CHECK);
        assert!(table.is_empty());
    }
}
