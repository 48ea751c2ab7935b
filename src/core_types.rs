//! Core identifiers shared by every module.

/// Platform account token. Treated as opaque and trusted.
pub type UserId = String;

/// Coin id on the external CLC ledger.
pub type CoinId = u64;

/// Exchange's own coin on the CLC ledger; every top-up merges into it.
pub const DEFAULT_EXCHANGE_COIN_ID: CoinId = 248;
