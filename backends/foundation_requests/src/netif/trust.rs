use super::SecTag;
use derive_more::From;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use std::collections::BTreeMap;

#[derive(From, Debug)]
pub enum TrustError {
    Pem(rustls_pki_types::pem::Error),

    #[from(ignore)]
    NoCertificates(SecTag),

    #[from(ignore)]
    UnknownTag(SecTag),

    #[from(ignore)]
    Rejected(String),
}

impl std::error::Error for TrustError {}

impl core::fmt::Display for TrustError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pem(err) => write!(f, "Failed to parse PEM certificates: {err}"),
            Self::NoCertificates(tag) => {
                write!(f, "No certificates found for security tag {tag}")
            }
            Self::UnknownTag(tag) => write!(f, "Security tag {tag} is not provisioned"),
            Self::Rejected(reason) => write!(f, "Trust anchor rejected: {reason}"),
        }
    }
}

/// Trust anchors provisioned per security tag.
///
/// Built once with [`TrustStore::builder`] and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: BTreeMap<SecTag, Vec<CertificateDer<'static>>>,
}

impl TrustStore {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> TrustStoreBuilder {
        TrustStoreBuilder::default()
    }

    #[must_use]
    pub fn contains(&self, tag: SecTag) -> bool {
        self.anchors.contains_key(&tag)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Certificates bound to `tag`, empty when the tag is unknown.
    #[must_use]
    pub fn certificates(&self, tag: SecTag) -> &[CertificateDer<'static>] {
        self.anchors.get(&tag).map_or(&[], Vec::as_slice)
    }

    /// Collects the anchors of `tags` into a rustls root store.
    ///
    /// # Errors
    ///
    /// Fails when a tag was never provisioned or holds a certificate rustls
    /// cannot use as an anchor.
    #[cfg(feature = "ssl-rustls")]
    pub(crate) fn root_store(&self, tags: &[SecTag]) -> Result<rustls::RootCertStore, TrustError> {
        let mut roots = rustls::RootCertStore::empty();
        for tag in tags {
            let certs = self.anchors.get(tag).ok_or(TrustError::UnknownTag(*tag))?;
            for cert in certs {
                roots
                    .add(cert.clone())
                    .map_err(|err| TrustError::Rejected(err.to_string()))?;
            }
        }
        Ok(roots)
    }
}

#[derive(Debug, Default)]
pub struct TrustStoreBuilder {
    anchors: BTreeMap<SecTag, Vec<CertificateDer<'static>>>,
}

impl TrustStoreBuilder {
    /// Adds every certificate found in a PEM bundle under `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error when the bundle is malformed or has no certificate.
    pub fn add_pem(mut self, tag: SecTag, pem: &[u8]) -> Result<Self, TrustError> {
        let certs: Vec<CertificateDer<'static>> =
            CertificateDer::pem_slice_iter(pem).collect::<Result<_, _>>()?;

        if certs.is_empty() {
            return Err(TrustError::NoCertificates(tag));
        }

        tracing::debug!("Provisioned {} certificate(s) under tag {}", certs.len(), tag);
        self.anchors.entry(tag).or_default().extend(certs);
        Ok(self)
    }

    /// Adds a single DER encoded certificate under `tag`.
    #[must_use]
    pub fn add_der(mut self, tag: SecTag, der: Vec<u8>) -> Self {
        self.anchors
            .entry(tag)
            .or_default()
            .push(CertificateDer::from(der));
        self
    }

    #[must_use]
    pub fn build(self) -> TrustStore {
        TrustStore {
            anchors: self.anchors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_has_no_tags() {
        let store = TrustStore::empty();
        assert!(store.is_empty());
        assert!(!store.contains(1));
        assert!(store.certificates(1).is_empty());
    }

    #[test]
    fn test_add_pem_without_certificates_is_rejected() {
        let result = TrustStore::builder().add_pem(1, b"not a pem bundle");
        assert!(matches!(result, Err(TrustError::NoCertificates(1))));
    }

    #[test]
    fn test_add_der_groups_by_tag() {
        let store = TrustStore::builder()
            .add_der(1, vec![0x30, 0x00])
            .add_der(1, vec![0x30, 0x01])
            .add_der(7, vec![0x30, 0x02])
            .build();

        assert_eq!(store.certificates(1).len(), 2);
        assert_eq!(store.certificates(7).len(), 1);
        assert!(!store.contains(2));
    }

    #[cfg(feature = "ssl-rustls")]
    #[test]
    fn test_root_store_rejects_unknown_tag() {
        let store = TrustStore::empty();
        assert!(matches!(store.root_store(&[3]), Err(TrustError::UnknownTag(3))));
    }

    #[cfg(feature = "ssl-rustls")]
    #[test]
    fn test_root_store_rejects_garbage_anchor() {
        let store = TrustStore::builder().add_der(1, vec![1, 2, 3]).build();
        assert!(matches!(store.root_store(&[1]), Err(TrustError::Rejected(_))));
    }
}
