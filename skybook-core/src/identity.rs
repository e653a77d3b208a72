use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

/// Credential hashing contract. Implementations must be deterministic: the
/// same password always produces the same digest under a fixed policy.
pub trait CredentialVerifier: Send + Sync {
    fn digest(&self, password: &str) -> Vec<u8>;

    fn verify(&self, password: &str, stored: &[u8]) -> bool {
        self.digest(password) == stored
    }
}

/// PBKDF2-HMAC-SHA1 under a fixed salt / iteration / key-length policy.
///
/// The salt is deliberately constant per deployment: digests are compared
/// byte-for-byte against the stored column, so every login must reproduce
/// the registration-time digest exactly.
#[derive(Debug, Clone)]
pub struct Pbkdf2Verifier {
    salt: Vec<u8>,
    iterations: u32,
    key_len: usize,
}

impl Pbkdf2Verifier {
    pub fn new(salt: impl Into<Vec<u8>>, iterations: u32, key_len: usize) -> Self {
        Self {
            salt: salt.into(),
            iterations,
            key_len,
        }
    }
}

impl Default for Pbkdf2Verifier {
    fn default() -> Self {
        Self::new(b"1234".to_vec(), 1024, 16)
    }
}

impl CredentialVerifier for Pbkdf2Verifier {
    fn digest(&self, password: &str) -> Vec<u8> {
        let mut out = vec![0u8; self.key_len];
        pbkdf2_hmac::<Sha1>(password.as_bytes(), &self.salt, self.iterations, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_fixed_length() {
        let verifier = Pbkdf2Verifier::default();
        let a = verifier.digest("hunter2");
        let b = verifier.digest("hunter2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn digest_depends_on_password_and_salt() {
        let verifier = Pbkdf2Verifier::default();
        assert_ne!(verifier.digest("hunter2"), verifier.digest("hunter3"));

        let other_salt = Pbkdf2Verifier::new(b"4321".to_vec(), 1024, 16);
        assert_ne!(verifier.digest("hunter2"), other_salt.digest("hunter2"));
    }

    #[test]
    fn verify_round_trip() {
        let verifier = Pbkdf2Verifier::default();
        let stored = verifier.digest("secret");
        assert!(verifier.verify("secret", &stored));
        assert!(!verifier.verify("Secret", &stored));
    }
}
