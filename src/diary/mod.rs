//! Journal entry storage and semantic search.
//!
//! [`store`] owns the entry write path (embedding computed at ingest time),
//! [`search`] is the read-only similarity accessor the chat tool calls into.
//! Embeddings are stored inline as little-endian f32 BLOBs.

pub mod search;
pub mod store;
pub mod types;

use anyhow::Result;

use crate::embedding::EMBEDDING_DIM;

/// Serialize an f32 embedding to little-endian bytes for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * std::mem::size_of::<f32>());
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a stored BLOB back into an f32 embedding.
///
/// Fails if the byte length does not correspond to [`EMBEDDING_DIM`] floats
/// (e.g. rows written by a different model — run `echo-journal re-embed`).
pub fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    anyhow::ensure!(
        bytes.len() == EMBEDDING_DIM * std::mem::size_of::<f32>(),
        "embedding blob has {} bytes, expected {}",
        bytes.len(),
        EMBEDDING_DIM * std::mem::size_of::<f32>()
    );
    Ok(bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_roundtrip() {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 1.0;
        v[17] = -0.5;
        v[383] = 0.25;

        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), EMBEDDING_DIM * 4);

        let back = bytes_to_embedding(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn wrong_length_blob_is_rejected() {
        let err = bytes_to_embedding(&[0u8; 12]);
        assert!(err.is_err());
    }
}
