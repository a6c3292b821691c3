// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Voting token bundles.
//!
//! A bundle is the unpadded base64url encoding of the JSON object
//! `{"t": <token hex>, "s": <signature base64>, "p": <poll id>}`. The
//! signature covers the token hex string itself.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::crypto::sha256_hex;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Voting token is not valid base64url")]
    Encoding,

    #[error("Voting token is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Voting token signature is not valid base64")]
    Signature,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBundle {
    /// 256-bit random token, hex
    #[serde(rename = "t")]
    pub token: String,
    /// RSASSA-PKCS1-v1_5/SHA-256 signature over `token`, base64
    #[serde(rename = "s")]
    pub signature: String,
    #[serde(rename = "p")]
    pub poll_id: u64,
}

impl TokenBundle {
    pub fn new(token: String, signature: &[u8], poll_id: u64) -> Self {
        Self {
            token,
            signature: Base64::encode_string(signature),
            poll_id,
        }
    }

    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64UrlUnpadded::encode_string(&json))
    }

    /// Decode token data. Trailing `=` padding is tolerated.
    pub fn decode(token_data: &str) -> Result<Self, TokenError> {
        let bytes = Base64UrlUnpadded::decode_vec(token_data.trim().trim_end_matches('='))
            .map_err(|_| TokenError::Encoding)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Hex SHA-256 of the token, the key of the used-token ledger.
    pub fn token_hash(&self) -> String {
        sha256_hex(self.token.as_bytes())
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, TokenError> {
        Base64::decode_vec(&self.signature).map_err(|_| TokenError::Signature)
    }
}

/// One issued token as handed to the poll owner.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct IssuedToken {
    pub token_hash: String,
    /// Encoded bundle to give to a voter
    pub token_data: String,
}
