use anchor_lang::prelude::*;

pub mod borrow;
pub mod convert;
pub mod math;
pub mod rates;
pub mod registry;
pub mod repay;
pub mod state;
pub mod supply;

use borrow::*;
use registry::*;
use repay::*;
use supply::*;

declare_id!("6dSchwXdKaLV4pF8fVvruB2CE7dN4Dq9Ah5Ls8rYZ2CQ");

/// Collateralized synthetic-fiat lending ledger. Users deposit a yield-bearing
/// collateral asset held at the custody venue, request borrows denominated in
/// registered fiat currencies, and repay against a per-currency compounding
/// borrow index whose rate tracks the currency's devaluation against the
/// collateral asset.
#[program]
pub mod fiat_ledger {
    use super::*;

    /// Create the protocol config and derive the custody authority.
    pub fn initialize(ctx: Context<Initialize>) -> Result<()> {
        registry::initialize(ctx)
    }

    /// Halt or resume deposits and new borrow requests.
    pub fn set_paused(ctx: Context<AdminOnly>, paused: bool) -> Result<()> {
        registry::set_paused(ctx, paused)
    }

    /// Register a collateral asset mint.
    pub fn add_asset(ctx: Context<AddAsset>) -> Result<()> {
        registry::add_asset(ctx)
    }

    pub fn set_asset_support(ctx: Context<UpdateAsset>, is_supported: bool) -> Result<()> {
        registry::set_asset_support(ctx, is_supported)
    }

    /// Register a borrowable fiat currency with its risk and rate parameters.
    pub fn add_currency(
        ctx: Context<AddCurrency>,
        code: [u8; 8],
        params: CurrencyParams,
    ) -> Result<()> {
        registry::add_currency(ctx, code, params)
    }

    pub fn update_currency(ctx: Context<UpdateCurrency>, params: CurrencyParams) -> Result<()> {
        registry::update_currency(ctx, params)
    }

    /// Create a currency's price feed and attach it to the currency record.
    pub fn init_price_feed(ctx: Context<InitPriceFeed>, authority: Pubkey) -> Result<()> {
        registry::init_price_feed(ctx, authority)
    }

    /// Push a new price, feed-authority only.
    pub fn set_price(ctx: Context<SetPrice>, price: u64) -> Result<()> {
        registry::set_price(ctx, price)
    }

    /// Deposit collateral into the custody venue and credit the supply ledger.
    pub fn deposit_collateral(ctx: Context<DepositCollateral>, amount: u64) -> Result<()> {
        supply::deposit_collateral(ctx, amount)
    }

    /// Withdraw unlocked collateral from the custody venue.
    pub fn withdraw_collateral(ctx: Context<WithdrawCollateral>, amount: u64) -> Result<()> {
        supply::withdraw_collateral(ctx, amount)
    }

    /// Record a pending borrow request against the caller's supply position.
    pub fn request_borrow(ctx: Context<RequestBorrow>, code: [u8; 8], amount: u64) -> Result<()> {
        borrow::request_borrow(ctx, code, amount)
    }

    /// Process one pending request, admin-only.
    pub fn process_request<'info>(
        ctx: Context<'_, '_, 'info, 'info, ProcessRequests<'info>>,
    ) -> Result<()> {
        borrow::process_request(ctx)
    }

    /// Process a bounded batch of pending requests for one
    /// (owner, asset, currency) triple, admin-only.
    pub fn process_requests<'info>(
        ctx: Context<'_, '_, 'info, 'info, ProcessRequests<'info>>,
    ) -> Result<()> {
        borrow::process_requests(ctx)
    }

    /// Cancel one pending request, admin-only.
    pub fn cancel_request<'info>(
        ctx: Context<'_, '_, 'info, 'info, CancelRequests<'info>>,
    ) -> Result<()> {
        borrow::cancel_request(ctx)
    }

    /// Cancel a bounded batch of pending requests, admin-only.
    pub fn cancel_requests<'info>(
        ctx: Context<'_, '_, 'info, 'info, CancelRequests<'info>>,
    ) -> Result<()> {
        borrow::cancel_requests(ctx)
    }

    /// Repay outstanding debt and release collateral proportionally.
    pub fn repay(ctx: Context<Repay>, amount: u64) -> Result<()> {
        repay::repay(ctx, amount)
    }

    /// Close an under-collateralized position, permissionless.
    pub fn liquidate(ctx: Context<Liquidate>) -> Result<()> {
        repay::liquidate(ctx)
    }
}
