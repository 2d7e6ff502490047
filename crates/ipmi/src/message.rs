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

//! IPMI LAN message format: the request/response payload carried inside a
//! session frame, with its two 2's-complement checksums.

use crate::IpmiError;

/// BMC responder address.
const BMC_ADDR: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmiRequest {
    pub netfn: u8,
    /// Responder LUN, from the request's NetFn byte. Echoed back in the
    /// response's rqSeq byte.
    pub lun: u8,
    pub cmd: u8,
    pub rq_addr: u8,
    pub rq_seq: u8,
    /// Requester LUN, from the request's rqSeq byte. The response's NetFn
    /// byte carries it back.
    pub rq_lun: u8,
    pub data: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

pub fn parse_request(payload: &[u8]) -> Result<IpmiRequest, IpmiError> {
    // rsAddr, netFn/rsLUN, cksum1, rqAddr, rqSeq/rqLUN, cmd, [data...], cksum2
    if payload.len() < 7 {
        return Err(IpmiError::Malformed("LAN message too short"));
    }
    if checksum(&payload[0..2]) != payload[2] {
        return Err(IpmiError::Malformed("LAN header checksum mismatch"));
    }
    let body = &payload[3..payload.len() - 1];
    if checksum(body) != payload[payload.len() - 1] {
        return Err(IpmiError::Malformed("LAN body checksum mismatch"));
    }
    Ok(IpmiRequest {
        netfn: payload[1] >> 2,
        lun: payload[1] & 0x03,
        cmd: payload[5],
        rq_addr: payload[3],
        rq_seq: payload[4] >> 2,
        rq_lun: payload[4] & 0x03,
        data: payload[6..payload.len() - 1].to_vec(),
    })
}

pub fn build_response(request: &IpmiRequest, completion: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len());
    out.push(request.rq_addr);
    out.push(((request.netfn | 0x01) << 2) | request.rq_lun);
    out.push(checksum(&out[0..2]));
    out.push(BMC_ADDR);
    out.push((request.rq_seq << 2) | request.lun);
    out.push(request.cmd);
    out.push(completion);
    out.extend_from_slice(data);
    let body_checksum = checksum(&out[3..]);
    out.push(body_checksum);
    out
}
