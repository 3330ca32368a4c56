//! Borrow request workflow and the active debt ledger. A request records
//! intent only; an admin later processes it, which sizes the collateral
//! requirement at the current price, locks collateral against the supply
//! ledger and folds the debt into the (owner, asset, currency) aggregate.

use anchor_lang::prelude::*;
use anchor_lang::AccountsExit;
use yield_vault::Reserve;

use crate::convert::{currency_to_asset, currency_unit_price, feed_price};
use crate::math::{mul_div, to_u64, RAY};
use crate::state::{
    AssetConfig, BorrowPosition, BorrowRequest, BorrowStatus, Config, CurrencyConfig, LedgerError,
    PriceFeed, RequestStatus, SupplyPosition, SupplyStatus, MAX_BATCH_REQUESTS,
};

impl BorrowPosition {
    /// Index-adjusted debt minus cumulative repayments, in raw fiat units.
    pub fn outstanding(&self, borrow_index: u128) -> Result<u64> {
        let owed =
            mul_div(self.borrowed_scaled, borrow_index, RAY).ok_or(LedgerError::MathOverflow)?;
        let owed = to_u64(owed).ok_or(LedgerError::MathOverflow)?;
        Ok(owed.saturating_sub(self.total_repaid))
    }

    /// A closed (repaid or liquidated) aggregate starts over when a new
    /// request against the same triple is processed.
    pub fn reactivate_if_closed(&mut self) {
        match self.status {
            BorrowStatus::Active => {}
            BorrowStatus::Inactive | BorrowStatus::Repaid | BorrowStatus::Liquidated => {
                self.borrowed_scaled = 0;
                self.locked_collateral = 0;
                self.total_repaid = 0;
                self.status = BorrowStatus::Active;
            }
        }
    }

    /// Fold a processed request into the aggregate. The increment is scaled
    /// by the current borrow index so future index growth accrues interest on
    /// it from this point only. Returns the scaled debt added.
    pub fn apply_borrow(
        &mut self,
        amount: u64,
        borrow_index: u128,
        required_collateral: u64,
    ) -> Result<u128> {
        let scaled = mul_div(amount as u128, RAY, borrow_index).ok_or(LedgerError::MathOverflow)?;
        self.borrowed_scaled = self
            .borrowed_scaled
            .checked_add(scaled)
            .ok_or(LedgerError::MathOverflow)?;
        self.locked_collateral = self
            .locked_collateral
            .checked_add(required_collateral)
            .ok_or(LedgerError::MathOverflow)?;
        Ok(scaled)
    }
}

/// Batch bound shared by process and cancel. Checked before any work so an
/// oversized call fails without touching a single request.
pub fn validate_batch(len: usize) -> Result<()> {
    require!(len > 0, LedgerError::EmptyBatch);
    require!(len <= MAX_BATCH_REQUESTS, LedgerError::BatchTooLarge);
    Ok(())
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub required_collateral: u64,
    pub scaled_debt: u128,
}

/// State transition for processing one pending request. The currency index
/// must already be accrued to the call's timestamp. Fails before any of the
/// three records is touched; on success the request is Processed, collateral
/// is locked and the debt aggregate updated.
pub fn apply_process(
    request: &mut BorrowRequest,
    supply: &mut SupplyPosition,
    borrow: &mut BorrowPosition,
    currency: &CurrencyConfig,
    price: u64,
    asset_decimals: u8,
    custody_index: u128,
) -> Result<ProcessOutcome> {
    require!(
        request.status == RequestStatus::Pending,
        LedgerError::InvalidStatus
    );

    let borrow_value = currency_to_asset(request.amount, price, asset_decimals)?;
    let required = mul_div(
        borrow_value as u128,
        currency.collateralization_ratio,
        RAY,
    )
    .and_then(to_u64)
    .ok_or(LedgerError::MathOverflow)?;

    supply.lock_collateral(required, custody_index)?;
    borrow.reactivate_if_closed();
    let scaled_debt = borrow.apply_borrow(request.amount, currency.borrow_index, required)?;
    request.status = RequestStatus::Processed;

    Ok(ProcessOutcome {
        required_collateral: required,
        scaled_debt,
    })
}

pub fn request_borrow(ctx: Context<RequestBorrow>, code: [u8; 8], amount: u64) -> Result<()> {
    ctx.accounts.config.ensure_not_paused()?;
    require!(amount > 0, LedgerError::InvalidAmount);
    require!(
        ctx.accounts.supply.status == SupplyStatus::Active,
        LedgerError::InvalidStatus
    );

    let supply = &mut ctx.accounts.supply;
    let request = &mut ctx.accounts.request;
    request.owner = ctx.accounts.owner.key();
    request.asset_mint = supply.asset_mint;
    request.currency = code;
    request.amount = amount;
    request.nonce = supply.request_nonce;
    request.created_at = Clock::get()?.unix_timestamp;
    request.status = RequestStatus::Pending;
    request.bump = ctx.bumps.request;

    supply.request_nonce = supply
        .request_nonce
        .checked_add(1)
        .ok_or(LedgerError::MathOverflow)?;

    emit!(BorrowRequestCreated {
        request: request.key(),
        owner: request.owner,
        asset_mint: request.asset_mint,
        currency: code,
        amount,
        nonce: request.nonce,
    });
    Ok(())
}

/// Process a single pending request: the batch entry point with exactly one
/// request in `remaining_accounts`.
pub fn process_request<'info>(
    ctx: Context<'_, '_, 'info, 'info, ProcessRequests<'info>>,
) -> Result<()> {
    require!(
        ctx.remaining_accounts.len() == 1,
        LedgerError::RequestMismatch
    );
    process_requests(ctx)
}

/// Process up to `MAX_BATCH_REQUESTS` pending requests against one
/// (owner, asset, currency) triple. Any invalid entry fails the whole call;
/// the runtime reverts every write, so no partially processed batch is ever
/// observable.
pub fn process_requests<'info>(
    ctx: Context<'_, '_, 'info, 'info, ProcessRequests<'info>>,
) -> Result<()> {
    let request_accounts = ctx.remaining_accounts;
    validate_batch(request_accounts.len())?;

    let now = Clock::get()?.unix_timestamp;

    // Sizing collateral needs a live price; a currency without a configured
    // feed cannot be borrowed against.
    let price = feed_price(&ctx.accounts.currency, &ctx.accounts.price_feed)?
        .ok_or(LedgerError::PriceUnavailable)?;
    let unit_price = currency_unit_price(price, ctx.accounts.currency.decimals)?;
    ctx.accounts.currency.accrue_index(now, Some(unit_price))?;

    let custody_index = ctx.accounts.reserve.normalized_income(now)?;

    {
        let borrow = &mut ctx.accounts.borrow;
        if borrow.owner == Pubkey::default() {
            borrow.owner = ctx.accounts.borrower.key();
            borrow.asset_mint = ctx.accounts.asset_config.mint;
            borrow.currency = ctx.accounts.currency.code;
            borrow.bump = ctx.bumps.borrow;
        }
    }

    for account_info in request_accounts {
        require!(account_info.is_writable, LedgerError::RequestMismatch);
        let mut request = Account::<BorrowRequest>::try_from(account_info)?;
        require_keys_eq!(
            request.owner,
            ctx.accounts.borrower.key(),
            LedgerError::RequestMismatch
        );
        require_keys_eq!(
            request.asset_mint,
            ctx.accounts.asset_config.mint,
            LedgerError::RequestMismatch
        );
        require!(
            request.currency == ctx.accounts.currency.code,
            LedgerError::RequestMismatch
        );

        let outcome = apply_process(
            &mut request,
            &mut ctx.accounts.supply,
            &mut ctx.accounts.borrow,
            &ctx.accounts.currency,
            price,
            ctx.accounts.asset_config.decimals,
            custody_index,
        )?;
        request.exit(ctx.program_id)?;

        emit!(BorrowRequestProcessed {
            request: request.key(),
            borrow: ctx.accounts.borrow.key(),
            owner: request.owner,
            amount: request.amount,
            required_collateral: outcome.required_collateral,
            scaled_debt: outcome.scaled_debt,
            borrow_index: ctx.accounts.currency.borrow_index,
        });
    }

    let borrow = &ctx.accounts.borrow;
    emit!(BorrowUpdated {
        borrow: borrow.key(),
        owner: borrow.owner,
        asset_mint: borrow.asset_mint,
        currency: borrow.currency,
        borrowed_scaled: borrow.borrowed_scaled,
        locked_collateral: borrow.locked_collateral,
        total_repaid: borrow.total_repaid,
        borrow_index: ctx.accounts.currency.borrow_index,
    });
    Ok(())
}

/// Cancel a single pending request.
pub fn cancel_request<'info>(
    ctx: Context<'_, '_, 'info, 'info, CancelRequests<'info>>,
) -> Result<()> {
    require!(
        ctx.remaining_accounts.len() == 1,
        LedgerError::RequestMismatch
    );
    cancel_requests(ctx)
}

/// Cancel up to `MAX_BATCH_REQUESTS` pending requests. No collateral or debt
/// side effects.
pub fn cancel_requests<'info>(
    ctx: Context<'_, '_, 'info, 'info, CancelRequests<'info>>,
) -> Result<()> {
    let request_accounts = ctx.remaining_accounts;
    validate_batch(request_accounts.len())?;

    for account_info in request_accounts {
        require!(account_info.is_writable, LedgerError::RequestMismatch);
        let mut request = Account::<BorrowRequest>::try_from(account_info)?;
        require!(
            request.status == RequestStatus::Pending,
            LedgerError::InvalidStatus
        );
        request.status = RequestStatus::Canceled;
        request.exit(ctx.program_id)?;

        emit!(BorrowRequestCanceled {
            request: request.key(),
            owner: request.owner,
        });
    }
    Ok(())
}

#[derive(Accounts)]
#[instruction(code: [u8; 8], amount: u64)]
pub struct RequestBorrow<'info> {
    #[account(seeds = [b"config"], bump = config.bump)]
    pub config: Account<'info, Config>,

    #[account(
        mut,
        seeds = [b"supply", owner.key().as_ref(), supply.asset_mint.as_ref()],
        bump = supply.bump,
        has_one = owner @ LedgerError::Unauthorized,
    )]
    pub supply: Account<'info, SupplyPosition>,

    #[account(
        seeds = [b"currency", code.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,

    #[account(
        init,
        payer = owner,
        space = BorrowRequest::LEN,
        seeds = [
            b"request",
            owner.key().as_ref(),
            supply.asset_mint.as_ref(),
            code.as_ref(),
            &supply.request_nonce.to_le_bytes(),
        ],
        bump
    )]
    pub request: Account<'info, BorrowRequest>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct ProcessRequests<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    #[account(mut)]
    pub admin: Signer<'info>,

    /// CHECK: the borrower the batch is processed for; every request in the
    /// batch is checked against this key
    pub borrower: UncheckedAccount<'info>,

    #[account(
        seeds = [b"asset", asset_config.mint.as_ref()],
        bump = asset_config.bump,
    )]
    pub asset_config: Account<'info, AssetConfig>,

    #[account(
        mut,
        seeds = [b"supply", borrower.key().as_ref(), asset_config.mint.as_ref()],
        bump = supply.bump,
    )]
    pub supply: Account<'info, SupplyPosition>,

    #[account(
        mut,
        seeds = [b"currency", currency.code.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,

    pub price_feed: Option<Account<'info, PriceFeed>>,

    #[account(
        seeds = [b"reserve", asset_config.mint.as_ref()],
        bump = reserve.bump,
        seeds::program = yield_vault::ID,
    )]
    pub reserve: Account<'info, Reserve>,

    #[account(
        init_if_needed,
        payer = admin,
        space = BorrowPosition::LEN,
        seeds = [
            b"borrow",
            borrower.key().as_ref(),
            asset_config.mint.as_ref(),
            currency.code.as_ref(),
        ],
        bump
    )]
    pub borrow: Account<'info, BorrowPosition>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct CancelRequests<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

#[event]
pub struct BorrowRequestCreated {
    pub request: Pubkey,
    pub owner: Pubkey,
    pub asset_mint: Pubkey,
    pub currency: [u8; 8],
    pub amount: u64,
    pub nonce: u64,
}

#[event]
pub struct BorrowRequestProcessed {
    pub request: Pubkey,
    pub borrow: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub required_collateral: u64,
    pub scaled_debt: u128,
    pub borrow_index: u128,
}

#[event]
pub struct BorrowRequestCanceled {
    pub request: Pubkey,
    pub owner: Pubkey,
}

#[event]
pub struct BorrowUpdated {
    pub borrow: Pubkey,
    pub owner: Pubkey,
    pub asset_mint: Pubkey,
    pub currency: [u8; 8],
    pub borrowed_scaled: u128,
    pub locked_collateral: u64,
    pub total_repaid: u64,
    pub borrow_index: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    // parity fixture: 2-decimal fiat, 2-decimal asset, one asset unit = one
    // fiat unit
    const PRICE: u64 = 100;
    const ASSET_DECIMALS: u8 = 2;

    fn currency() -> CurrencyConfig {
        CurrencyConfig {
            code: *b"ARS\0\0\0\0\0",
            decimals: 2,
            collateralization_ratio: 3 * RAY / 2, // 150%
            liquidation_threshold: 6 * RAY / 5,   // 120%
            price_feed: None,
            base_rate: RAY / 20, // 5%
            min_rate: 0,
            max_rate: RAY,
            sensitivity: RAY,
            borrow_index: RAY,
            last_index_update: 0,
            bump: 255,
        }
    }

    fn supply_with(balance: u64) -> SupplyPosition {
        let mut s = SupplyPosition {
            owner: Pubkey::new_unique(),
            asset_mint: Pubkey::new_unique(),
            scaled_balance: 0,
            used_collateral: 0,
            request_nonce: 0,
            status: SupplyStatus::Inactive,
            bump: 255,
        };
        s.apply_deposit(balance, RAY).unwrap();
        s
    }

    fn request_for(supply: &SupplyPosition, amount: u64) -> BorrowRequest {
        BorrowRequest {
            owner: supply.owner,
            asset_mint: supply.asset_mint,
            currency: *b"ARS\0\0\0\0\0",
            amount,
            nonce: 0,
            created_at: 0,
            status: RequestStatus::Pending,
            bump: 255,
        }
    }

    fn borrow_for(supply: &SupplyPosition) -> BorrowPosition {
        BorrowPosition {
            owner: supply.owner,
            asset_mint: supply.asset_mint,
            currency: *b"ARS\0\0\0\0\0",
            borrowed_scaled: 0,
            locked_collateral: 0,
            total_repaid: 0,
            status: BorrowStatus::Inactive,
            bump: 255,
        }
    }

    #[test]
    fn batch_bound_is_enforced() {
        assert_eq!(
            validate_batch(0).unwrap_err(),
            LedgerError::EmptyBatch.into()
        );
        validate_batch(1).unwrap();
        validate_batch(MAX_BATCH_REQUESTS).unwrap();
        assert_eq!(
            validate_batch(MAX_BATCH_REQUESTS + 1).unwrap_err(),
            LedgerError::BatchTooLarge.into()
        );
    }

    #[test]
    fn processing_locks_required_collateral() {
        // deposit 1000, borrow value 300 at 150% => required 450
        let mut supply = supply_with(1_000);
        let mut request = request_for(&supply, 300);
        let mut borrow = borrow_for(&supply);
        let currency = currency();

        let outcome = apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency,
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap();

        assert_eq!(outcome.required_collateral, 450);
        assert_eq!(supply.used_collateral, 450);
        assert_eq!(supply.available_collateral(RAY).unwrap(), 550);
        assert_eq!(borrow.borrowed_scaled, 300);
        assert_eq!(borrow.locked_collateral, 450);
        assert_eq!(borrow.status, BorrowStatus::Active);
        assert_eq!(request.status, RequestStatus::Processed);
    }

    #[test]
    fn insufficient_collateral_leaves_state_unchanged() {
        let mut supply = supply_with(100);
        let mut request = request_for(&supply, 300); // needs 450
        let mut borrow = borrow_for(&supply);

        let err = apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency(),
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap_err();

        assert_eq!(err, LedgerError::InsufficientCollateral.into());
        assert_eq!(supply.used_collateral, 0);
        assert_eq!(borrow.borrowed_scaled, 0);
        assert_eq!(borrow.status, BorrowStatus::Inactive);
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn repeated_requests_accumulate_into_one_position() {
        let mut supply = supply_with(10_000);
        let mut borrow = borrow_for(&supply);
        let currency = currency();

        for _ in 0..2 {
            let mut request = request_for(&supply, 300);
            apply_process(
                &mut request,
                &mut supply,
                &mut borrow,
                &currency,
                PRICE,
                ASSET_DECIMALS,
                RAY,
            )
            .unwrap();
        }

        assert_eq!(borrow.borrowed_scaled, 600);
        assert_eq!(borrow.locked_collateral, 900);
        assert_eq!(supply.used_collateral, 900);
    }

    #[test]
    fn non_pending_request_is_rejected() {
        let mut supply = supply_with(1_000);
        let mut request = request_for(&supply, 10);
        request.status = RequestStatus::Canceled;
        let mut borrow = borrow_for(&supply);

        let err = apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency(),
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::InvalidStatus.into());
    }

    #[test]
    fn closed_position_reactivates_clean() {
        let mut supply = supply_with(1_000);
        let mut borrow = borrow_for(&supply);
        borrow.status = BorrowStatus::Repaid;
        borrow.total_repaid = 777;
        borrow.borrowed_scaled = 555;

        let mut request = request_for(&supply, 100);
        apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency(),
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap();

        assert_eq!(borrow.status, BorrowStatus::Active);
        assert_eq!(borrow.total_repaid, 0);
        assert_eq!(borrow.borrowed_scaled, 100);
        assert_eq!(borrow.locked_collateral, 150);
    }

    #[test]
    fn debt_increment_is_scaled_by_the_borrow_index() {
        let mut supply = supply_with(100_000);
        let mut borrow = borrow_for(&supply);
        let mut currency = currency();
        // index grew 25% before this borrow
        currency.borrow_index = RAY + RAY / 4;

        let mut request = request_for(&supply, 1_000);
        apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency,
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap();

        // 1000 / 1.25 = 800 scaled units; valued back at the same index this
        // is the original 1000
        assert_eq!(borrow.borrowed_scaled, 800);
        assert_eq!(borrow.outstanding(currency.borrow_index).unwrap(), 1_000);
    }

    #[test]
    fn outstanding_grows_with_the_index() {
        let mut supply = supply_with(100_000);
        let mut borrow = borrow_for(&supply);
        let currency = currency();

        let mut request = request_for(&supply, 10_000);
        apply_process(
            &mut request,
            &mut supply,
            &mut borrow,
            &currency,
            PRICE,
            ASSET_DECIMALS,
            RAY,
        )
        .unwrap();

        assert_eq!(borrow.outstanding(RAY).unwrap(), 10_000);
        // one year at 5%
        assert_eq!(borrow.outstanding(RAY + RAY / 20).unwrap(), 10_500);
    }
}
