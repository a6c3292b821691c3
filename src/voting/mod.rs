// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Anonymous Voting
//!
//! Per-poll RSA keys sign voting tokens. A voter presents a signed token
//! instead of a session, the server checks the signature against the poll's
//! verification key and records the token hash so it cannot be spent twice.
//!
//! - `crypto` - RSA keys, signatures and hashing helpers
//! - `token` - The token bundle wire format
//! - `issuer` - Batch token issuance
//! - `redeem` - Token verification and redemption
//! - `key_cache` - Parsed verification keys

pub mod crypto;
pub mod issuer;
pub mod key_cache;
pub mod redeem;
pub mod token;

pub use crypto::{CryptoError, CryptoResult, KeyPair};
pub use issuer::{TokenIssuer, MAX_TOKENS_PER_BATCH};
pub use key_cache::VerificationKeyCache;
pub use redeem::{TokenRedeemer, VerifiedToken};
pub use token::{IssuedToken, TokenBundle, TokenError};
