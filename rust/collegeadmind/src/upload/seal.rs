use super::draft::StudentDraft;
use sha2::{Digest, Sha256};

/// Binds a preview row's sanitized data to the workspace that produced it, so
/// a commit can tell an approved row from one edited on the client.
#[derive(Debug, Clone)]
pub struct RowSealer {
    key: String,
}

impl RowSealer {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn seal(&self, row_number: usize, draft: &StudentDraft) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b"\n");
        hasher.update(row_number.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(draft.canonical_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(&self, row_number: usize, draft: &StudentDraft, seal: &str) -> bool {
        let expected = self.seal(row_number, draft);
        // Compare every byte regardless of where the first mismatch is.
        expected.len() == seal.len()
            && expected
                .bytes()
                .zip(seal.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
