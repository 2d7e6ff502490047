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

//! Server TLS material: either the operator-provided certificate and key,
//! or a process-local self-signed certificate generated at startup.

use std::path::Path;
use std::sync::Arc;

use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::ServerConfig;
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use vbmc_config::SslConfig;

#[derive(thiserror::Error, Debug)]
pub enum TlsError {
    #[error("could not read {path}: {error}")]
    ReadFile {
        path: String,
        error: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("self-signed certificate generation failed: {0}")]
    SelfSigned(#[from] rcgen::Error),
}

/// Build the rustls server config shared by every Redfish listener.
///
/// Note: axum-server has a RustlsConfig::from_pem shortcut, but it builds a
/// rustls config without a default crypto provider; construct the
/// ServerConfig explicitly with the ring provider instead.
pub fn server_config(ssl: &SslConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let (certs, key) = match (&ssl.cert_path, &ssl.key_path) {
        (Some(cert_path), Some(key_path)) => load_pem_pair(cert_path, key_path)?,
        _ => self_signed()?,
    };

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

fn load_pem_pair(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let cert_pem = std::fs::read(cert_path).map_err(|error| TlsError::ReadFile {
        path: cert_path.display().to_string(),
        error,
    })?;
    let key_pem = std::fs::read(key_path).map_err(|error| TlsError::ReadFile {
        path: key_path.display().to_string(),
        error,
    })?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| TlsError::ReadFile {
            path: cert_path.display().to_string(),
            error,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }

    // Scan the whole PEM file for the key in case it is not the first item.
    let key = rustls_pemfile::read_all(&mut key_pem.as_slice())
        .filter_map(Result::ok)
        .find_map(|item| match item {
            Item::Sec1Key(key) => Some(PrivateKeyDer::Sec1(key)),
            Item::Pkcs1Key(key) => Some(PrivateKeyDer::Pkcs1(key)),
            Item::Pkcs8Key(key) => Some(PrivateKeyDer::Pkcs8(key)),
            _ => None,
        })
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.display().to_string()))?;

    Ok((certs, key))
}

fn self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_der = cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    Ok((vec![cert_der], PrivateKeyDer::Pkcs8(key_der)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_config_builds() {
        let config = server_config(&SslConfig::default()).expect("self-signed config");
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn missing_cert_file_is_reported() {
        let ssl = SslConfig {
            cert_path: Some("/nonexistent/tls.crt".into()),
            key_path: Some("/nonexistent/tls.key".into()),
        };
        assert!(matches!(
            server_config(&ssl),
            Err(TlsError::ReadFile { .. })
        ));
    }
}
