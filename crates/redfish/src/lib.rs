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

//! Redfish front-end: one TLS listener per managed VM serving the resource
//! tree a bare-metal orchestrator inspects and drives. Read paths never
//! fail on vSphere outages; they degrade to cached or synthetic payloads
//! with healthy status.

mod auth;
mod bios;
mod chassis;
mod event_service;
mod json;
mod log_services;
mod managers;
mod resource;
mod secure_boot;
mod server;
mod service_root;
mod session_service;
mod state;
mod storage;
mod systems;
mod task_service;
mod tls;
mod update_service;

pub use server::{RedfishServer, RedfishServerHandle, SpawnError, build_router};
pub use state::AppState;
pub use tls::{TlsError, server_config};
