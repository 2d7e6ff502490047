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

//! Per-VM UDP listener: receive, decode, dispatch, reply. The listener is
//! stateless beyond the session table; anything malformed or unauthorized
//! is dropped without a response.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vbmc_state::ManagedVm;
use vbmc_vsphere::VmBackend;

use crate::commands::{Dispatcher, allowed_pre_session, netfn};
use crate::message::{build_response, parse_request};
use crate::rakp::{self, RakpReply};
use crate::rmcp::{self, InboundFrame, PayloadType, PlusFrame};
use crate::session::{ConfidentialityAlgorithm, SESSION_REAP_INTERVAL, SessionPhase, SessionTable};
use crate::{IpmiError, crypto};

const RECV_BUFFER_SIZE: usize = 4096;
const CLOSE_SESSION_CMD: u8 = 0x3C;

#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("could not bind IPMI UDP port {port}: {error}")]
    Bind { port: u16, error: std::io::Error },
}

/// A running IPMI listener. Dropping the shutdown sender stops the
/// receive loop.
#[derive(Debug)]
pub struct IpmiServerHandle {
    pub local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl IpmiServerHandle {
    pub fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<()>) {
        (self.shutdown_tx, self.join_handle)
    }

    pub async fn shutdown_and_wait(self) {
        let (shutdown_tx, join_handle) = self.into_parts();
        drop(shutdown_tx);
        join_handle.await.expect("IPMI listener task panicked");
    }
}

pub struct IpmiServer {
    dispatcher: Dispatcher,
    sessions: SessionTable,
}

impl IpmiServer {
    pub fn new(vm: Arc<ManagedVm>, backend: Arc<dyn VmBackend>) -> Self {
        Self {
            dispatcher: Dispatcher::new(vm, backend),
            sessions: SessionTable::new(),
        }
    }

    /// Bind the VM's IPMI port and run the receive loop in the background.
    pub async fn spawn(
        vm: Arc<ManagedVm>,
        backend: Arc<dyn VmBackend>,
        port: u16,
    ) -> Result<IpmiServerHandle, SpawnError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|error| SpawnError::Bind { port, error })?;
        let local_addr = socket
            .local_addr()
            .map_err(|error| SpawnError::Bind { port, error })?;
        let vm_name = vm.name().to_string();
        tracing::info!(vm = %vm_name, %local_addr, "IPMI listener started");

        let server = IpmiServer::new(vm, backend);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            let mut reaper = tokio::time::interval(SESSION_REAP_INTERVAL);
            loop {
                tokio::select! {
                    received = socket.recv_from(&mut buf) => {
                        let (len, peer) = match received {
                            Ok(received) => received,
                            Err(error) => {
                                tracing::warn!(vm = %vm_name, "UDP receive error: {error}");
                                continue;
                            }
                        };
                        if let Some(reply) = server.handle_datagram(&buf[..len], peer).await {
                            if let Err(error) = socket.send_to(&reply, peer).await {
                                tracing::warn!(vm = %vm_name, "UDP send error: {error}");
                            }
                        }
                    }
                    _ = reaper.tick() => {
                        let reaped = server.sessions.reap_idle();
                        if reaped > 0 {
                            tracing::debug!(vm = %vm_name, reaped, "reaped idle IPMI sessions");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!(vm = %vm_name, "IPMI listener shutting down");
                        break;
                    }
                }
            }
        });

        Ok(IpmiServerHandle {
            local_addr,
            shutdown_tx,
            join_handle,
        })
    }

    /// Process one datagram; `None` means no response is sent.
    pub async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let frame = match rmcp::parse_frame(datagram) {
            Ok(frame) => frame,
            Err(IpmiError::Malformed(reason)) => {
                tracing::trace!(%peer, reason, len = datagram.len(), "dropping datagram");
                return None;
            }
            Err(_) => return None,
        };

        match frame {
            InboundFrame::Legacy { payload } => self.handle_legacy(&payload).await,
            InboundFrame::Plus(plus) if plus.session_id == 0 => {
                self.handle_pre_session(plus, peer).await
            }
            InboundFrame::Plus(plus) => self.handle_in_session(plus, datagram, peer).await,
        }
    }

    /// IPMI 1.5 session-less probe. Only the authentication capability
    /// command is honored here; everything else needs a real session.
    async fn handle_legacy(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let request = parse_request(payload).ok()?;
        if !allowed_pre_session(request.netfn, request.cmd) {
            return None;
        }
        let (completion, data) = self.dispatcher.dispatch(&request, 0).await;
        let response = build_response(&request, completion, &data);
        Some(rmcp::build_legacy_frame(&response))
    }

    async fn handle_pre_session(&self, frame: PlusFrame, peer: SocketAddr) -> Option<Vec<u8>> {
        let vm_config = &self.dispatcher.vm().config;
        let reply = match frame.payload_type {
            PayloadType::OpenSessionRequest => {
                rakp::handle_open_session(&self.sessions, peer, &frame.payload)
            }
            PayloadType::Rakp1 => rakp::handle_rakp1(&self.sessions, peer, &frame.payload, vm_config),
            PayloadType::Rakp3 => rakp::handle_rakp3(&self.sessions, peer, &frame.payload, vm_config),
            PayloadType::IpmiMessage => {
                let request = parse_request(&frame.payload).ok()?;
                if !allowed_pre_session(request.netfn, request.cmd) {
                    return None;
                }
                let (completion, data) = self.dispatcher.dispatch(&request, 0).await;
                let response = build_response(&request, completion, &data);
                return Some(rmcp::build_plus_frame(
                    PayloadType::IpmiMessage,
                    0,
                    0,
                    &response,
                    None,
                    false,
                ));
            }
            _ => return None,
        };

        match reply {
            RakpReply::Send {
                payload_type,
                payload,
            } => Some(rmcp::build_plus_frame(payload_type, 0, 0, &payload, None, false)),
            RakpReply::Drop => None,
        }
    }

    async fn handle_in_session(
        &self,
        frame: PlusFrame,
        datagram: &[u8],
        peer: SocketAddr,
    ) -> Option<Vec<u8>> {
        // Established traffic must be authenticated; a session id with no
        // AuthCode is either a downgrade attempt or garbage.
        if !frame.authenticated {
            return None;
        }

        let (console_session_id, k1, k2, confidentiality, phase) = self
            .sessions
            .with_session(frame.session_id, peer, |session| {
                (
                    session.console_session_id,
                    session.k1,
                    session.k2,
                    session.confidentiality,
                    session.phase,
                )
            })?;
        if matches!(phase, SessionPhase::OpenAck | SessionPhase::Rakp2Sent) {
            // Keys are not final before RAKP3 succeeded.
            return None;
        }

        if let Err(err) = rmcp::verify_authcode(datagram, &k1) {
            tracing::debug!(%peer, session = frame.session_id, "dropping packet: {err}");
            return None;
        }

        let sequence_ok = self
            .sessions
            .with_session(frame.session_id, peer, |session| {
                let ok = session.accept_sequence(frame.sequence);
                if ok {
                    session.touch();
                    if session.phase == SessionPhase::Rakp4Sent {
                        session.phase = SessionPhase::Established;
                    }
                }
                ok
            })?;
        if !sequence_ok {
            tracing::debug!(
                %peer,
                session = frame.session_id,
                sequence = frame.sequence,
                "dropping replayed packet"
            );
            return None;
        }

        let payload = if frame.encrypted {
            if confidentiality != ConfidentialityAlgorithm::AesCbc128 {
                return None;
            }
            crypto::aes_cbc_decrypt(&k2, &frame.payload).ok()?
        } else if confidentiality == ConfidentialityAlgorithm::AesCbc128 {
            // Confidentiality was negotiated; refuse plaintext payloads.
            return None;
        } else {
            frame.payload
        };

        if frame.payload_type != PayloadType::IpmiMessage {
            return None;
        }
        let request = parse_request(&payload).ok()?;

        let privilege = self
            .sessions
            .with_session(frame.session_id, peer, |session| session.privilege)?;
        let (completion, data) = self.dispatcher.dispatch(&request, privilege).await;
        let response = build_response(&request, completion, &data);

        let outbound_sequence = self
            .sessions
            .with_session(frame.session_id, peer, |session| {
                session.next_outbound_sequence()
            })?;
        let encrypt = confidentiality == ConfidentialityAlgorithm::AesCbc128;
        let reply = rmcp::build_plus_frame(
            PayloadType::IpmiMessage,
            console_session_id,
            outbound_sequence,
            &response,
            Some((&k1, &k2)),
            encrypt,
        );

        if request.netfn == netfn::APP && request.cmd == CLOSE_SESSION_CMD {
            self.sessions.remove(frame.session_id);
            tracing::debug!(session = frame.session_id, "IPMI session closed");
        }
        Some(reply)
    }
}
