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

//! RAKP-HMAC-SHA1 key material and the per-packet cipher primitives.

use aes::Aes128;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use crate::IpmiError;

type HmacSha1 = Hmac<Sha1>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const SHA1_LEN: usize = 20;
pub const AUTHCODE_LEN: usize = 12;
const AES_BLOCK: usize = 16;

pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; SHA1_LEN] {
    let mut mac = HmacSha1::new_from_slice(key).expect("BUG: HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA1-96: the full HMAC truncated to its first 12 bytes.
pub fn hmac_sha1_96(key: &[u8], data: &[u8]) -> [u8; AUTHCODE_LEN] {
    let full = hmac_sha1(key, data);
    let mut truncated = [0u8; AUTHCODE_LEN];
    truncated.copy_from_slice(&full[..AUTHCODE_LEN]);
    truncated
}

/// Managed-system GUID. Derived from the VM name so it is stable across
/// restarts and distinct per endpoint.
pub fn managed_guid(vm_name: &str) -> [u8; 16] {
    let digest = Sha1::digest(vm_name.as_bytes());
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&digest[..16]);
    guid
}

/// RAKP2 key-exchange authentication code, keyed with the user's password.
pub fn rakp2_authcode(
    password: &[u8],
    console_session_id: u32,
    managed_session_id: u32,
    rand_console: &[u8; 16],
    rand_managed: &[u8; 16],
    guid: &[u8; 16],
    role: u8,
    username: &[u8],
) -> [u8; SHA1_LEN] {
    let mut input = Vec::with_capacity(58 + username.len());
    input.extend_from_slice(&console_session_id.to_le_bytes());
    input.extend_from_slice(&managed_session_id.to_le_bytes());
    input.extend_from_slice(rand_console);
    input.extend_from_slice(rand_managed);
    input.extend_from_slice(guid);
    input.push(role);
    input.push(username.len() as u8);
    input.extend_from_slice(username);
    hmac_sha1(password, &input)
}

/// RAKP3 key-exchange authentication code the console must present.
pub fn rakp3_authcode(
    password: &[u8],
    rand_managed: &[u8; 16],
    console_session_id: u32,
    role: u8,
    username: &[u8],
) -> [u8; SHA1_LEN] {
    let mut input = Vec::with_capacity(22 + username.len());
    input.extend_from_slice(rand_managed);
    input.extend_from_slice(&console_session_id.to_le_bytes());
    input.push(role);
    input.push(username.len() as u8);
    input.extend_from_slice(username);
    hmac_sha1(password, &input)
}

/// Session integrity key. No BMC key (K_G) is provisioned, so the user
/// password keys the derivation.
pub fn derive_sik(
    password: &[u8],
    rand_console: &[u8; 16],
    rand_managed: &[u8; 16],
    role: u8,
    username: &[u8],
) -> [u8; SHA1_LEN] {
    let mut input = Vec::with_capacity(34 + username.len());
    input.extend_from_slice(rand_console);
    input.extend_from_slice(rand_managed);
    input.push(role);
    input.push(username.len() as u8);
    input.extend_from_slice(username);
    hmac_sha1(password, &input)
}

/// K1 (integrity) and K2 (confidentiality) follow from the SIK by HMACing
/// 20 constant bytes.
pub fn derive_k(sik: &[u8; SHA1_LEN], constant: u8) -> [u8; SHA1_LEN] {
    hmac_sha1(sik, &[constant; SHA1_LEN])
}

/// RAKP4 integrity check value, keyed with the SIK.
pub fn rakp4_icv(
    sik: &[u8; SHA1_LEN],
    rand_console: &[u8; 16],
    managed_session_id: u32,
    guid: &[u8; 16],
) -> [u8; AUTHCODE_LEN] {
    let mut input = Vec::with_capacity(36);
    input.extend_from_slice(rand_console);
    input.extend_from_slice(&managed_session_id.to_le_bytes());
    input.extend_from_slice(guid);
    hmac_sha1_96(sik, &input)
}

/// AES-CBC-128 confidentiality: a random IV followed by the ciphertext.
/// Plaintext is padded with 0x01, 0x02, ... then a pad-length byte, per the
/// IPMI confidentiality payload format.
pub fn aes_cbc_encrypt(k2: &[u8; SHA1_LEN], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; AES_BLOCK];
    rand::fill(&mut iv);

    let pad_len = (AES_BLOCK - ((plaintext.len() + 1) % AES_BLOCK)) % AES_BLOCK;
    let mut padded = Vec::with_capacity(plaintext.len() + pad_len + 1);
    padded.extend_from_slice(plaintext);
    for i in 0..pad_len {
        padded.push((i + 1) as u8);
    }
    padded.push(pad_len as u8);

    let cipher = Aes128CbcEnc::new_from_slices(&k2[..AES_BLOCK], &iv)
        .expect("BUG: key and IV lengths are fixed");
    let len = padded.len();
    let ciphertext = cipher
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .expect("BUG: input is block-aligned");

    let mut out = Vec::with_capacity(AES_BLOCK + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(ciphertext);
    out
}

pub fn aes_cbc_decrypt(k2: &[u8; SHA1_LEN], data: &[u8]) -> Result<Vec<u8>, IpmiError> {
    if data.len() < AES_BLOCK * 2 || (data.len() - AES_BLOCK) % AES_BLOCK != 0 {
        return Err(IpmiError::Malformed("bad encrypted payload length"));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK);
    let cipher = Aes128CbcDec::new_from_slices(&k2[..AES_BLOCK], iv)
        .expect("BUG: key and IV lengths are fixed");
    let mut buf = ciphertext.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| IpmiError::Malformed("AES decrypt failed"))?;

    let Some(&pad_len) = plaintext.last() else {
        return Err(IpmiError::Malformed("empty decrypted payload"));
    };
    let pad_len = pad_len as usize;
    if pad_len + 1 > plaintext.len() {
        return Err(IpmiError::Malformed("bad confidentiality pad"));
    }
    Ok(plaintext[..plaintext.len() - pad_len - 1].to_vec())
}
