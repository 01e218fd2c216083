//! Shared fixtures for unit tests.

use std::sync::OnceLock;
use std::time::Duration;

use crate::crypto::certificate::{issue_self_signed, SelfSignedIdentity};
use crate::package::MemoryPackage;

/// A self-signed 1024-bit RSA identity, generated once per test binary.
///
/// # Panics
///
/// Panics if key generation fails.
pub fn identity() -> &'static SelfSignedIdentity {
    static IDENTITY: OnceLock<SelfSignedIdentity> = OnceLock::new();
    IDENTITY.get_or_init(|| {
        issue_self_signed("Unit Test Signer", 1024, Duration::from_secs(86_400))
            .expect("issue test certificate")
    })
}

/// A second, unrelated identity.
///
/// # Panics
///
/// Panics if key generation fails.
pub fn other_identity() -> &'static SelfSignedIdentity {
    static IDENTITY: OnceLock<SelfSignedIdentity> = OnceLock::new();
    IDENTITY.get_or_init(|| {
        issue_self_signed("Unit Test Other", 1024, Duration::from_secs(86_400))
            .expect("issue test certificate")
    })
}

/// Minimal unsigned package with one page.
pub fn sample_package() -> MemoryPackage {
    MemoryPackage::from_entries([
        ("OFD.xml", b"<ofd:OFD><ofd:DocBody/></ofd:OFD>".to_vec()),
        ("Doc_0/Document.xml", b"<ofd:Document><ofd:Pages/></ofd:Document>".to_vec()),
        (
            "Doc_0/Pages/Page_0/Content.xml",
            b"<ofd:Page><ofd:Content>Hello OFD</ofd:Content></ofd:Page>".to_vec(),
        ),
    ])
}
