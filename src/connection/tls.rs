//! TLS settings for secured broker endpoints.
//!
//! [`TlsSettings`] is the transport-level form of an endpoint's
//! [`SslOption`](crate::options::SslOption). It is built once per endpoint
//! during normalization and turned into a rustls `ClientConfig` when a TLS
//! connection is attempted.

use crate::options::{PolicyErrors, SslOption};
use crate::BrokerError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_name, WebPkiServerVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use std::fs;
use std::sync::Arc;

/// TLS settings for a single endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Name expected on the server certificate, also sent as SNI
    pub server_name: String,
    /// PEM file with a client certificate chain and key, or extra CA certificates
    pub certificate_path: String,
    /// Whether TLS is used for this endpoint
    pub enabled: bool,
    /// Passphrase for an encrypted client key
    pub certificate_passphrase: Option<String>,
    /// Tolerated validation failures (None = transport defaults)
    pub acceptable_policy_errors: Option<PolicyErrors>,
}

impl TlsSettings {
    /// Create settings with only the mandatory fields
    pub fn new(
        server_name: impl Into<String>,
        certificate_path: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            certificate_path: certificate_path.into(),
            enabled,
            certificate_passphrase: None,
            acceptable_policy_errors: None,
        }
    }

    /// Convert endpoint TLS options.
    ///
    /// The passphrase is copied only when non-empty and the policy errors only
    /// when present; otherwise both stay unset.
    pub fn from_ssl_option(option: &SslOption) -> Self {
        let mut settings = Self::new(
            option.server_name.clone(),
            option.certificate_path.clone(),
            option.enabled,
        );
        if let Some(passphrase) = option
            .certificate_passphrase
            .as_ref()
            .filter(|p| !p.is_empty())
        {
            settings.certificate_passphrase = Some(passphrase.clone());
        }
        if let Some(errors) = option.acceptable_policy_errors {
            settings.acceptable_policy_errors = Some(errors);
        }
        settings
    }

    /// Server name for SNI, falling back to the endpoint host when unset
    pub fn sni_name(&self, host: &str) -> Result<String, BrokerError> {
        if self.server_name.is_empty() {
            parse_server_name(host)
        } else {
            parse_server_name(&self.server_name)
        }
    }

    /// Build the rustls client configuration.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Tls` if:
    /// - the certificate file cannot be read or holds no usable PEM items
    /// - a passphrase is configured (encrypted keys are not supported)
    /// - no root certificates could be loaded
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, BrokerError> {
        if self.certificate_passphrase.is_some() {
            return Err(BrokerError::Tls(
                "encrypted client keys are not supported; provide an unencrypted PEM key".into(),
            ));
        }

        let mut roots = load_system_roots();
        let mut client_identity = None;

        if !self.certificate_path.is_empty() {
            let (certs, key) = load_pem(&self.certificate_path)?;
            match key {
                Some(key) => client_identity = Some((certs, key)),
                None => {
                    for cert in certs {
                        roots.add(cert).map_err(|e| {
                            BrokerError::Tls(format!(
                                "invalid CA certificate in '{}': {}",
                                self.certificate_path, e
                            ))
                        })?;
                    }
                }
            }
        }

        if roots.is_empty() {
            return Err(BrokerError::Tls(
                "failed to load any root certificates".to_string(),
            ));
        }

        let tolerated = self.acceptable_policy_errors.unwrap_or_default();
        let builder = if tolerated.is_empty() {
            ClientConfig::builder().with_webpki_verifier(webpki_verifier(roots)?)
        } else {
            tracing::warn!(
                server_name = %self.server_name,
                tolerated = %tolerated,
                "certificate validation relaxed for endpoint"
            );
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(PolicyVerifier::new(roots, tolerated)?))
        };

        let config = match client_identity {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| BrokerError::Tls(format!("invalid client certificate: {}", e)))?,
            None => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

fn webpki_verifier(roots: RootCertStore) -> Result<Arc<WebPkiServerVerifier>, BrokerError> {
    WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| BrokerError::Tls(format!("failed to build verifier: {}", e)))
}

/// Load system roots, falling back to the bundled Mozilla roots
fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    let _ = store.add_parsable_certificates(result.certs);

    if store.is_empty() {
        if !result.errors.is_empty() {
            tracing::debug!(
                errors = result.errors.len(),
                "no native root certificates, using webpki roots"
            );
        }
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

/// Read certificates and an optional private key from a PEM file
fn load_pem(
    path: &str,
) -> Result<(Vec<CertificateDer<'static>>, Option<PrivateKeyDer<'static>>), BrokerError> {
    let data = fs::read(path).map_err(|e| {
        BrokerError::Tls(format!("failed to read certificate file '{}': {}", path, e))
    })?;

    let mut reader = std::io::Cursor::new(&data);
    let mut certs = Vec::new();
    let mut key = None;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => certs.push(cert),
            Ok(Some(Item::Pkcs8Key(k))) => key = Some(PrivateKeyDer::Pkcs8(k)),
            Ok(Some(Item::Pkcs1Key(k))) => key = Some(PrivateKeyDer::Pkcs1(k)),
            Ok(Some(Item::Sec1Key(k))) => key = Some(PrivateKeyDer::Sec1(k)),
            Ok(Some(_)) => {
                // CRLs and other items are not used
            }
            Ok(None) => break,
            Err(_) => {
                return Err(BrokerError::Tls(format!(
                    "failed to parse PEM data from '{}'",
                    path
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(BrokerError::Tls(format!(
            "no valid certificates found in '{}'",
            path
        )));
    }

    Ok((certs, key))
}

/// Map a rustls certificate error to the policy error class it belongs to
fn policy_error_class(error: &CertificateError) -> PolicyErrors {
    match error {
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
            PolicyErrors::REMOTE_CERTIFICATE_NAME_MISMATCH
        }
        _ => PolicyErrors::REMOTE_CERTIFICATE_CHAIN_ERRORS,
    }
}

/// WebPKI verification that lets configured policy error classes through.
///
/// WebPKI stops at the first failure and checks the chain before the name,
/// so when a chain error is tolerated the name is checked separately and
/// still rejected unless name mismatches are tolerated too.
///
/// TLS servers always present a certificate, so
/// `REMOTE_CERTIFICATE_NOT_AVAILABLE` never relaxes anything here.
#[derive(Debug)]
struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    tolerated: PolicyErrors,
}

impl PolicyVerifier {
    fn new(roots: RootCertStore, tolerated: PolicyErrors) -> Result<Self, BrokerError> {
        Ok(Self {
            inner: webpki_verifier(roots)?,
            tolerated,
        })
    }

    fn tolerates(&self, class: PolicyErrors) -> bool {
        self.tolerated.contains(class)
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let err = match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(err)) => err,
            other => return other,
        };

        let class = policy_error_class(&err);
        if !self.tolerates(class) {
            return Err(rustls::Error::InvalidCertificate(err));
        }

        if class == PolicyErrors::REMOTE_CERTIFICATE_CHAIN_ERRORS
            && !self.tolerates(PolicyErrors::REMOTE_CERTIFICATE_NAME_MISMATCH)
        {
            let parsed = ParsedCertificate::try_from(end_entity)?;
            verify_server_name(&parsed, server_name)?;
        }

        tracing::debug!(error = ?err, "tolerating certificate error");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// # Errors
///
/// Returns an error if the hostname is invalid.
pub fn parse_server_name(hostname: &str) -> Result<String, BrokerError> {
    // Remove trailing dot if present
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(BrokerError::Tls(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == ':')
    {
        return Err(BrokerError::Tls(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
