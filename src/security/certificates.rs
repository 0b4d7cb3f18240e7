// src/security/certificates.rs

use crate::constants::{CERT_FILE, ICON_PLACEHOLDER, KEY_FILE};
use crate::error::Error;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads a PEM keypair from disk and yields rustls server configurations.
///
/// The provider is optional at the factory level: when construction fails the
/// cleartext protocols stay available and only TLS/H3 listeners are refused.
pub struct FileCertificateProvider {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl FileCertificateProvider {
    /// Look for `server.crt` / `server.key` inside `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "certificate directory not found: {}",
                dir.display()
            )));
        }
        let cert_path = dir.join(CERT_FILE);
        let key_path = dir.join(KEY_FILE);
        if !cert_path.is_file() {
            return Err(Error::Config(format!(
                "certificate file not found: {}",
                cert_path.display()
            )));
        }
        if !key_path.is_file() {
            return Err(Error::Config(format!(
                "key file not found: {}",
                key_path.display()
            )));
        }
        println!("{}TLS key and cert located.", ICON_PLACEHOLDER);
        Ok(Self {
            cert_path,
            key_path,
        })
    }

    /// Load certs, then the private key (try pkcs8, then pkcs1/rsa).
    fn load_keypair(
        &self,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), Error> {
        let cert_file = File::open(&self.cert_path)?;
        let mut reader = StdBufReader::new(cert_file);
        let certs_vec: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("failed to parse certificate: {}", e)))?;
        if certs_vec.is_empty() {
            return Err(Error::Config(format!(
                "no certificates in {}",
                self.cert_path.display()
            )));
        }

        let mut key_opt: Option<PrivateKeyDer<'static>> = None;
        let key_file = File::open(&self.key_path)?;
        let mut reader = StdBufReader::new(key_file);
        if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut reader)
            .filter_map(|k| k.ok())
            .next()
        {
            key_opt = Some(PrivateKeyDer::Pkcs8(key));
        }
        if key_opt.is_none() {
            let mut reader = StdBufReader::new(File::open(&self.key_path)?);
            let rsa_key = rustls_pemfile::rsa_private_keys(&mut reader)
                .filter_map(|k| k.ok())
                .next();
            if let Some(key) = rsa_key {
                key_opt = Some(PrivateKeyDer::Pkcs1(key));
            }
        }
        let key = key_opt.ok_or_else(|| {
            Error::Config(format!(
                "no usable private key in {}",
                self.key_path.display()
            ))
        })?;
        Ok((certs_vec, key))
    }

    fn base_config(&self) -> Result<ServerConfig, Error> {
        let (certs, key) = self.load_keypair()?;
        // TLS 1.2 is the floor; anything older is refused at handshake.
        ServerConfig::builder_with_protocol_versions(&[
            &rustls::version::TLS12,
            &rustls::version::TLS13,
        ])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Config(format!("invalid cert/key: {}", e)))
    }

    /// TLS configuration for plain HTTP/1.1 over TLS.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, Error> {
        Ok(Arc::new(self.base_config()?))
    }

    /// TLS configuration advertising HTTP/2 with an HTTP/1.1 fallback.
    pub fn server_config_h2(&self) -> Result<Arc<ServerConfig>, Error> {
        let mut cfg = self.base_config()?;
        cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(cfg))
    }

    /// TLS configuration for HTTP/3 over QUIC.
    pub fn server_config_h3(&self) -> Result<ServerConfig, Error> {
        let mut cfg = self.base_config()?;
        cfg.alpn_protocols = vec![b"h3".to_vec(), b"h3-29".to_vec()];
        Ok(cfg)
    }
}
