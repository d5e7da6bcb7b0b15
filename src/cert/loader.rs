use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use tokio::fs;
use tracing::info;

use crate::error::{Error, Result};

/// Read the PEM certificate chain and private key from disk and build the
/// TLS server config used for every accepted connection.
pub async fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let cert_pem = fs::read_to_string(cert_path).await.map_err(|e| {
        Error::CertParse(format!("failed to read {}: {e}", cert_path.display()))
    })?;
    let key_pem = fs::read_to_string(key_path).await.map_err(|e| {
        Error::CertParse(format!("failed to read {}: {e}", key_path.display()))
    })?;

    let config = build_server_config(&cert_pem, &key_pem)?;
    info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "TLS credentials loaded"
    );

    Ok(Arc::new(config))
}

/// Parse PEM certificate chain and private key, then build a rustls ServerConfig.
pub fn build_server_config(cert_pem: &str, key_pem: &str) -> Result<ServerConfig> {
    let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::CertParse(format!("failed to parse certificate PEM: {e}")))?;

    if certs.is_empty() {
        return Err(Error::CertParse("no certificates found in PEM".into()));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| Error::CertParse(format!("failed to parse private key PEM: {e}")))?
        .ok_or_else(|| Error::CertParse("no private key found in PEM".into()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(format!("failed to build TLS server config: {e}")))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    #[test]
    fn builds_config_from_valid_pem() {
        let (cert, key) = self_signed();
        assert!(build_server_config(&cert, &key).is_ok());
    }

    #[test]
    fn rejects_missing_certificate() {
        let (_, key) = self_signed();
        let err = build_server_config("", &key).unwrap_err();
        assert!(matches!(err, Error::CertParse(_)));
    }

    #[test]
    fn rejects_missing_key() {
        let (cert, _) = self_signed();
        let err = build_server_config(&cert, "").unwrap_err();
        assert!(matches!(err, Error::CertParse(_)));
    }

    #[tokio::test]
    async fn loads_credentials_from_files() {
        let (cert, key) = self_signed();
        let dir = std::env::temp_dir().join(format!("tls-relay-cert-{}", std::process::id()));
        fs::create_dir_all(&dir).await.unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        fs::write(&cert_path, cert).await.unwrap();
        fs::write(&key_path, key).await.unwrap();

        let result = load_server_config(&cert_path, &key_path).await;
        let _ = fs::remove_dir_all(&dir).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let missing = Path::new("/nonexistent/tls-relay/cert.pem");
        let err = load_server_config(missing, missing).await.unwrap_err();
        assert!(matches!(err, Error::CertParse(_)));
    }
}
