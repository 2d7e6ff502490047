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

//! IPMI 2.0 / RMCP+ BMC front-end.
//!
//! One UDP listener per managed VM. The engine implements the narrow slice
//! of IPMI the orchestrator exercises: RMCP framing, RMCP+ session
//! establishment with RAKP-HMAC-SHA1, HMAC-SHA1-96 packet integrity with
//! optional AES-CBC-128 confidentiality, and the Chassis / App / Storage /
//! Sensor / DCMI command subset. Malformed or unauthenticated traffic is
//! dropped without a response.

pub mod commands;
pub mod crypto;
pub mod message;
pub mod rakp;
pub mod rmcp;
pub mod server;
pub mod session;

pub use commands::completion;
pub use message::{IpmiRequest, build_response, parse_request};
pub use rmcp::{InboundFrame, PayloadType, parse_frame};
pub use server::{IpmiServer, IpmiServerHandle, SpawnError};
pub use session::{SESSION_IDLE_TIMEOUT, SessionTable};

#[derive(thiserror::Error, Debug)]
pub enum IpmiError {
    /// Framing or checksum failure. The datagram is dropped silently.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    /// Authentication failure (bad AuthCode, replay, unknown session).
    /// Also dropped silently per the protocol.
    #[error("authentication rejected: {0}")]
    AuthRejected(&'static str),
}
