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

//! RMCP+ session table: one entry per in-flight handshake or established
//! session, keyed by the managed-system session id we hand out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::crypto::SHA1_LEN;

pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const SESSION_REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Inbound sequence numbers are accepted within this distance of the
/// highest one seen.
const REPLAY_WINDOW: u32 = 8;

pub const PRIV_ADMINISTRATOR: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Open Session Response sent, waiting for RAKP1.
    OpenAck,
    /// RAKP2 sent, waiting for RAKP3.
    Rakp2Sent,
    /// RAKP4 sent; the first valid authenticated packet establishes.
    Rakp4Sent,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidentialityAlgorithm {
    None,
    AesCbc128,
}

pub struct IpmiSession {
    pub remote: SocketAddr,
    pub console_session_id: u32,
    pub managed_session_id: u32,
    pub phase: SessionPhase,
    pub privilege: u8,
    /// Role byte from RAKP1, verbatim: it participates in the HMACs.
    pub role: u8,
    pub username: Vec<u8>,
    pub confidentiality: ConfidentialityAlgorithm,
    pub rand_console: [u8; 16],
    pub rand_managed: [u8; 16],
    pub sik: [u8; SHA1_LEN],
    pub k1: [u8; SHA1_LEN],
    pub k2: [u8; SHA1_LEN],
    pub outbound_sequence: u32,
    highest_inbound_sequence: u32,
    last_activity: Instant,
}

impl IpmiSession {
    pub fn new(remote: SocketAddr, console_session_id: u32, managed_session_id: u32) -> Self {
        Self {
            remote,
            console_session_id,
            managed_session_id,
            phase: SessionPhase::OpenAck,
            privilege: PRIV_ADMINISTRATOR,
            role: 0,
            username: Vec::new(),
            confidentiality: ConfidentialityAlgorithm::None,
            rand_console: [0; 16],
            rand_managed: [0; 16],
            sik: [0; SHA1_LEN],
            k1: [0; SHA1_LEN],
            k2: [0; SHA1_LEN],
            outbound_sequence: 0,
            highest_inbound_sequence: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Sliding replay window over inbound session sequence numbers. The
    /// window admits sequences within ±8 of the highest accepted value and
    /// never moves backwards.
    pub fn accept_sequence(&mut self, sequence: u32) -> bool {
        if sequence == 0 {
            // Sequence 0 is only valid on unauthenticated packets, which
            // never reach this check.
            return false;
        }
        let highest = self.highest_inbound_sequence;
        let accepted = if sequence > highest {
            sequence - highest <= REPLAY_WINDOW
        } else {
            highest - sequence <= REPLAY_WINDOW
        };
        if accepted && sequence > highest {
            self.highest_inbound_sequence = sequence;
        }
        accepted
    }

    pub fn next_outbound_sequence(&mut self) -> u32 {
        self.outbound_sequence = self.outbound_sequence.wrapping_add(1).max(1);
        self.outbound_sequence
    }
}

#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<u32, IpmiSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, IpmiSession>> {
        self.sessions
            .lock()
            .expect("BUG: IPMI session table lock poisoned")
    }

    /// Allocate a managed session id not currently in use and insert the
    /// new session in its handshake phase.
    pub fn open(&self, remote: SocketAddr, console_session_id: u32) -> u32 {
        let mut sessions = self.lock();
        let mut managed_id: u32 = rand::random();
        while managed_id == 0 || sessions.contains_key(&managed_id) {
            managed_id = rand::random();
        }
        sessions.insert(
            managed_id,
            IpmiSession::new(remote, console_session_id, managed_id),
        );
        managed_id
    }

    /// Run `f` on the session, if it exists and belongs to `remote`.
    /// Packets that name somebody else's session are treated as forged and
    /// yield `None`, which the server drops silently.
    pub fn with_session<R>(
        &self,
        managed_session_id: u32,
        remote: SocketAddr,
        f: impl FnOnce(&mut IpmiSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&managed_session_id)?;
        if session.remote.ip() != remote.ip() {
            return None;
        }
        Some(f(session))
    }

    pub fn remove(&self, managed_session_id: u32) -> Option<IpmiSession> {
        self.lock().remove(&managed_session_id)
    }

    pub fn reap_idle(&self) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < SESSION_IDLE_TIMEOUT);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
