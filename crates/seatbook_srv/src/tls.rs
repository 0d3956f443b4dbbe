use axum_server::tls_rustls::RustlsConfig;

/// PEM certificate and key paths for serving https.
pub struct TlsConfig {
    cert_path: std::path::PathBuf,
    key_path: std::path::PathBuf,
}

impl TlsConfig {
    /// Read the tls paths from the server config.
    ///
    /// Errors if only one of `tls_cert` and `tls_key` is set.
    pub fn from_config(config: &crate::Config) -> std::io::Result<Option<Self>> {
        match (&config.tls_cert, &config.tls_key) {
            (Some(cert_path), Some(key_path)) => Ok(Some(Self {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(std::io::Error::other(
                "tls_cert and tls_key must be provided together",
            )),
        }
    }

    /// Load the certificate and key into a [RustlsConfig].
    pub async fn load(&self) -> std::io::Result<RustlsConfig> {
        RustlsConfig::from_pem_file(&self.cert_path, &self.key_path).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cert_without_key() {
        let config = crate::Config {
            tls_cert: Some("cert.pem".into()),
            ..crate::Config::testing()
        };
        assert!(TlsConfig::from_config(&config).is_err());
        assert!(TlsConfig::from_config(&crate::Config::testing())
            .unwrap()
            .is_none());
    }
}
