//! TLS connector for the PostgreSQL connection.
//!
//! Two modes, mirroring libpq:
//!
//! | Root certificate | Mode | Checks |
//! |------------------|------|--------|
//! | none | `require` | encryption and handshake signatures only |
//! | `--ssl-root-cert` | `verify-full` | chain to `webpki-roots` or the given roots, and host name |

use crate::{Error, Result};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::path::Path;
use std::sync::Arc;
use tokio_postgres_rustls::MakeRustlsConnect;

/// How the server certificate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Encrypt without checking the certificate chain (`sslmode=require`).
    Require,
    /// Check the chain and host name (`sslmode=verify-full`).
    VerifyFull,
}

impl TlsMode {
    /// Verification is only requested by supplying a root certificate.
    #[must_use]
    pub const fn for_root(extra_root: Option<&Path>) -> Self {
        if extra_root.is_some() {
            Self::VerifyFull
        } else {
            Self::Require
        }
    }
}

/// Accepts any certificate but still checks that the server owns it.
#[derive(Debug)]
struct EncryptOnly {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for EncryptOnly {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Builds the rustls connector used for every connection.
pub(super) fn make_connector(extra_root: Option<&Path>) -> Result<MakeRustlsConnect> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mode = TlsMode::for_root(extra_root);

    let roots = match extra_root {
        Some(path) => {
            let mut roots = web_roots();
            let added = add_pem_roots(&mut roots, path)?;
            tracing::debug!(path = %path.display(), added, "Loaded extra root certificates");
            Some(roots)
        },
        None => None,
    };
    let verifier = server_verifier(roots, &provider)?;
    tracing::debug!(?mode, "TLS mode");

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

/// Returns a chain-checking verifier over `roots`, or an encrypt-only one
/// when no roots are given.
fn server_verifier(
    roots: Option<rustls::RootCertStore>,
    provider: &Arc<CryptoProvider>,
) -> Result<Arc<dyn ServerCertVerifier>> {
    match roots {
        Some(roots) => {
            let verifier: Arc<dyn ServerCertVerifier> =
                WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
                    .build()
                    .map_err(|e| Error::Connection(format!("TLS setup failed: {e}")))?;
            Ok(verifier)
        },
        None => Ok(Arc::new(EncryptOnly {
            algorithms: provider.signature_verification_algorithms,
        })),
    }
}

fn web_roots() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Adds every certificate of a PEM file to `roots`. Returns the count added.
fn add_pem_roots(roots: &mut rustls::RootCertStore, path: &Path) -> Result<usize> {
    let certs = CertificateDer::pem_file_iter(path).map_err(|e| Error::Connection(format!(
        "cannot read root certificate {}: {e:?}",
        path.display()
    )))?;

    let mut added = 0;
    for cert in certs {
        let cert = cert.map_err(|e| {
            Error::Connection(format!("invalid PEM in {}: {e:?}", path.display()))
        })?;
        roots.add(cert).map_err(tls_error)?;
        added += 1;
    }

    if added == 0 {
        return Err(Error::Connection(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(added)
}

/// Helper to map rustls errors.
#[allow(clippy::needless_pass_by_value)]
fn tls_error(e: rustls::Error) -> Error {
    Error::Connection(format!("TLS setup failed: {e}"))
}
