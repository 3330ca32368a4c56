use anchor_lang::prelude::*;

pub const CURRENCY_CODE_LEN: usize = 8;

/// Upper bound on requests touched by one batched admin call.
pub const MAX_BATCH_REQUESTS: usize = 50;

/// Protocol singleton. Admin key gates the registry and request processing;
/// the custody authority PDA (seeds ["custody"]) is the manager registered
/// with every yield-vault reserve.
#[account]
pub struct Config {
    pub admin: Pubkey,
    pub custody_authority_bump: u8,
    pub paused: bool,
    pub bump: u8,
}

impl Config {
    pub const LEN: usize = 8 + // discriminator
        32 + // admin
        1 +  // custody_authority_bump
        1 +  // paused
        1; // bump

    /// Gate for operations that add exposure (deposits, new borrow
    /// requests). Exits never consult this: withdrawal, repayment and
    /// liquidation stay available while paused.
    pub fn ensure_not_paused(&self) -> Result<()> {
        require!(!self.paused, LedgerError::ProtocolPaused);
        Ok(())
    }
}

/// Collateral asset entry. Never deleted, only disabled.
#[account]
pub struct AssetConfig {
    pub mint: Pubkey,
    pub decimals: u8,
    pub is_supported: bool,
    pub bump: u8,
}

impl AssetConfig {
    pub const LEN: usize = 8 + 32 + 1 + 1 + 1;
}

/// Borrowable synthetic fiat currency. Ratios and rates are RAY-scaled;
/// `borrow_index` starts at RAY and only grows.
#[account]
pub struct CurrencyConfig {
    pub code: [u8; CURRENCY_CODE_LEN],
    pub decimals: u8,
    pub collateralization_ratio: u128,
    pub liquidation_threshold: u128,
    pub price_feed: Option<Pubkey>,
    pub base_rate: u128,
    pub min_rate: u128,
    pub max_rate: u128,
    pub sensitivity: u128,
    pub borrow_index: u128,
    pub last_index_update: i64,
    pub bump: u8,
}

impl CurrencyConfig {
    pub const LEN: usize = 8 + // discriminator
        CURRENCY_CODE_LEN + // code
        1 +  // decimals
        16 + // collateralization_ratio
        16 + // liquidation_threshold
        1 + 32 + // price_feed Option
        16 + // base_rate
        16 + // min_rate
        16 + // max_rate
        16 + // sensitivity
        16 + // borrow_index
        8 +  // last_index_update
        1; // bump
}

/// Push oracle quoting fiat units (at currency decimals) per one whole
/// collateral-asset unit. A zero price means the feed is unavailable.
#[account]
pub struct PriceFeed {
    pub authority: Pubkey,
    pub currency: [u8; CURRENCY_CODE_LEN],
    pub price: u64,
    pub updated_at: i64,
    pub bump: u8,
}

impl PriceFeed {
    pub const LEN: usize = 8 + 32 + CURRENCY_CODE_LEN + 8 + 8 + 1;
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SupplyStatus {
    Inactive,
    Active,
}

/// One deposit position per (owner, asset). `scaled_balance` is stored in
/// custody-index units: multiplying by the reserve's current index recovers
/// the grown real value. `used_collateral` is in raw asset units.
#[account]
pub struct SupplyPosition {
    pub owner: Pubkey,
    pub asset_mint: Pubkey,
    pub scaled_balance: u64,
    pub used_collateral: u64,
    pub request_nonce: u64,
    pub status: SupplyStatus,
    pub bump: u8,
}

impl SupplyPosition {
    pub const LEN: usize = 8 + // discriminator
        32 + // owner
        32 + // asset_mint
        8 +  // scaled_balance
        8 +  // used_collateral
        8 +  // request_nonce
        1 +  // status
        1; // bump
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum RequestStatus {
    Pending,
    Processed,
    Canceled,
}

/// Borrow intent. Pending is the only mutable state; it transitions exactly
/// once to Processed or Canceled. The nonce comes from the owner's supply
/// position so repeated identical requests stay distinguishable.
#[account]
pub struct BorrowRequest {
    pub owner: Pubkey,
    pub asset_mint: Pubkey,
    pub currency: [u8; CURRENCY_CODE_LEN],
    pub amount: u64,
    pub nonce: u64,
    pub created_at: i64,
    pub status: RequestStatus,
    pub bump: u8,
}

impl BorrowRequest {
    pub const LEN: usize = 8 + // discriminator
        32 + // owner
        32 + // asset_mint
        CURRENCY_CODE_LEN + // currency
        8 +  // amount
        8 +  // nonce
        8 +  // created_at
        1 +  // status
        1; // bump
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum BorrowStatus {
    Inactive,
    Active,
    Repaid,
    Liquidated,
}

/// Running debt aggregate per (owner, asset, currency). `borrowed_scaled` is
/// borrow-index-scaled so interest accrues lazily; a closed position
/// reactivates with zeroed figures when a later request against the same
/// triple is processed.
#[account]
pub struct BorrowPosition {
    pub owner: Pubkey,
    pub asset_mint: Pubkey,
    pub currency: [u8; CURRENCY_CODE_LEN],
    pub borrowed_scaled: u128,
    pub locked_collateral: u64,
    pub total_repaid: u64,
    pub status: BorrowStatus,
    pub bump: u8,
}

impl BorrowPosition {
    pub const LEN: usize = 8 + // discriminator
        32 + // owner
        32 + // asset_mint
        CURRENCY_CODE_LEN + // currency
        16 + // borrowed_scaled
        8 +  // locked_collateral
        8 +  // total_repaid
        1 +  // status
        1; // bump
}

#[error_code]
pub enum LedgerError {
    #[msg("Invalid configuration")]
    InvalidConfig,
    #[msg("Asset is not supported")]
    AssetNotSupported,
    #[msg("Protocol is paused")]
    ProtocolPaused,
    #[msg("Unauthorized")]
    Unauthorized,
    #[msg("Amount must be greater than zero")]
    InvalidAmount,
    #[msg("Record is not in the required status")]
    InvalidStatus,
    #[msg("Insufficient collateral to cover the borrow")]
    InsufficientCollateral,
    #[msg("Amount exceeds available balance")]
    InsufficientAvailable,
    #[msg("Amount exceeds outstanding debt")]
    ExceedsOutstanding,
    #[msg("Position is not liquidatable")]
    NotLiquidatable,
    #[msg("Price feed unavailable or zero")]
    PriceUnavailable,
    #[msg("Arithmetic overflow")]
    MathOverflow,
    #[msg("Batch exceeds the maximum size")]
    BatchTooLarge,
    #[msg("Batch contains no requests")]
    EmptyBatch,
    #[msg("Request does not match the position being processed")]
    RequestMismatch,
    #[msg("Price feed does not match the currency configuration")]
    FeedMismatch,
}
