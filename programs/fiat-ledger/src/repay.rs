//! Repayment and liquidation. Both sync the currency's borrow index before
//! reading outstanding debt. Repayment releases collateral in proportion to
//! the share of debt retired; liquidation closes an under-collateralized
//! position and frees all of its locked collateral.

use anchor_lang::prelude::*;
use yield_vault::Reserve;

use crate::convert::{currency_to_asset, currency_unit_price, feed_price};
use crate::math::{mul_div, ray_div, to_u64};
use crate::state::{
    AssetConfig, BorrowPosition, BorrowStatus, CurrencyConfig, LedgerError, PriceFeed,
    SupplyPosition,
};

#[derive(Debug)]
pub struct RepayOutcome {
    pub released_collateral: u64,
    pub outstanding_after: u64,
    pub fully_repaid: bool,
}

/// State transition for one repayment. The borrow index must already be
/// accrued. `release = locked * amount / outstanding`, floored; a full
/// repayment closes the position and frees any rounding residue.
pub fn apply_repay(
    borrow: &mut BorrowPosition,
    supply: &mut SupplyPosition,
    amount: u64,
    borrow_index: u128,
) -> Result<RepayOutcome> {
    require!(
        borrow.status == BorrowStatus::Active,
        LedgerError::InvalidStatus
    );
    require!(amount > 0, LedgerError::InvalidAmount);

    let outstanding = borrow.outstanding(borrow_index)?;
    require!(amount <= outstanding, LedgerError::ExceedsOutstanding);

    let released = if borrow.locked_collateral == 0 {
        0
    } else {
        let share = mul_div(
            borrow.locked_collateral as u128,
            amount as u128,
            outstanding as u128,
        )
        .ok_or(LedgerError::MathOverflow)?;
        to_u64(share)
            .ok_or(LedgerError::MathOverflow)?
            .min(borrow.locked_collateral)
    };

    borrow.total_repaid = borrow
        .total_repaid
        .checked_add(amount)
        .ok_or(LedgerError::MathOverflow)?;
    borrow.locked_collateral = borrow
        .locked_collateral
        .checked_sub(released)
        .ok_or(LedgerError::MathOverflow)?;
    supply.release_collateral(released);

    let outstanding_after = outstanding - amount;
    let mut released = released;
    if outstanding_after == 0 {
        supply.release_collateral(borrow.locked_collateral);
        released = released.saturating_add(borrow.locked_collateral);
        borrow.locked_collateral = 0;
        borrow.status = BorrowStatus::Repaid;
    }

    Ok(RepayOutcome {
        released_collateral: released,
        outstanding_after,
        fully_repaid: outstanding_after == 0,
    })
}

#[derive(Debug)]
pub struct LiquidationOutcome {
    pub released_collateral: u64,
    pub collateral_value: u64,
    pub debt_value: u64,
    pub ratio: u128,
}

/// State transition for liquidating one position. Collateral is the owner's
/// whole supply valued at the custody venue's index; debt is the outstanding
/// fiat amount converted to asset terms. Only `ratio < liquidationThreshold`
/// liquidates. Debt figures stay on the closed position as history.
pub fn apply_liquidation(
    borrow: &mut BorrowPosition,
    supply: &mut SupplyPosition,
    currency: &CurrencyConfig,
    price: u64,
    asset_decimals: u8,
    custody_index: u128,
) -> Result<LiquidationOutcome> {
    require!(
        borrow.status == BorrowStatus::Active,
        LedgerError::InvalidStatus
    );

    let outstanding = borrow.outstanding(currency.borrow_index)?;
    let debt_value = currency_to_asset(outstanding, price, asset_decimals)?;
    require!(debt_value > 0, LedgerError::NotLiquidatable);

    let collateral_value = supply.value_at(custody_index)?;
    let ratio =
        ray_div(collateral_value as u128, debt_value as u128).ok_or(LedgerError::MathOverflow)?;
    require!(
        ratio < currency.liquidation_threshold,
        LedgerError::NotLiquidatable
    );

    let released = borrow.locked_collateral;
    supply.release_collateral(released);
    borrow.locked_collateral = 0;
    borrow.status = BorrowStatus::Liquidated;

    Ok(LiquidationOutcome {
        released_collateral: released,
        collateral_value,
        debt_value,
        ratio,
    })
}

pub fn repay(ctx: Context<Repay>, amount: u64) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;

    let price = feed_price(&ctx.accounts.currency, &ctx.accounts.price_feed)?;
    let unit_price = match price {
        Some(p) => Some(currency_unit_price(p, ctx.accounts.currency.decimals)?),
        None => None,
    };
    ctx.accounts.currency.accrue_index(now, unit_price)?;

    let outcome = apply_repay(
        &mut ctx.accounts.borrow,
        &mut ctx.accounts.supply,
        amount,
        ctx.accounts.currency.borrow_index,
    )?;

    emit!(LoanRepaid {
        borrow: ctx.accounts.borrow.key(),
        owner: ctx.accounts.owner.key(),
        currency: ctx.accounts.currency.code,
        amount,
        released_collateral: outcome.released_collateral,
        outstanding: outcome.outstanding_after,
        fully_repaid: outcome.fully_repaid,
        borrow_index: ctx.accounts.currency.borrow_index,
    });
    Ok(())
}

/// Permissionless. Anyone may close a position whose collateral no longer
/// covers its debt at the liquidation threshold.
pub fn liquidate(ctx: Context<Liquidate>) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;

    let price = feed_price(&ctx.accounts.currency, &ctx.accounts.price_feed)?
        .ok_or(LedgerError::PriceUnavailable)?;
    let unit_price = currency_unit_price(price, ctx.accounts.currency.decimals)?;
    ctx.accounts.currency.accrue_index(now, Some(unit_price))?;

    let custody_index = ctx.accounts.reserve.normalized_income(now)?;

    let outcome = apply_liquidation(
        &mut ctx.accounts.borrow,
        &mut ctx.accounts.supply,
        &ctx.accounts.currency,
        price,
        ctx.accounts.asset_config.decimals,
        custody_index,
    )?;

    emit!(CollateralLiquidated {
        borrow: ctx.accounts.borrow.key(),
        owner: ctx.accounts.borrow.owner,
        liquidator: ctx.accounts.liquidator.key(),
        currency: ctx.accounts.currency.code,
        released_collateral: outcome.released_collateral,
        collateral_value: outcome.collateral_value,
        debt_value: outcome.debt_value,
        ratio: outcome.ratio,
    });
    Ok(())
}

#[derive(Accounts)]
pub struct Repay<'info> {
    pub owner: Signer<'info>,

    #[account(
        mut,
        seeds = [
            b"borrow",
            owner.key().as_ref(),
            borrow.asset_mint.as_ref(),
            borrow.currency.as_ref(),
        ],
        bump = borrow.bump,
        has_one = owner @ LedgerError::Unauthorized,
    )]
    pub borrow: Account<'info, BorrowPosition>,

    #[account(
        mut,
        seeds = [b"supply", owner.key().as_ref(), borrow.asset_mint.as_ref()],
        bump = supply.bump,
    )]
    pub supply: Account<'info, SupplyPosition>,

    #[account(
        mut,
        seeds = [b"currency", borrow.currency.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,

    pub price_feed: Option<Account<'info, PriceFeed>>,
}

#[derive(Accounts)]
pub struct Liquidate<'info> {
    pub liquidator: Signer<'info>,

    #[account(
        mut,
        seeds = [
            b"borrow",
            borrow.owner.as_ref(),
            borrow.asset_mint.as_ref(),
            borrow.currency.as_ref(),
        ],
        bump = borrow.bump,
    )]
    pub borrow: Account<'info, BorrowPosition>,

    #[account(
        mut,
        seeds = [b"supply", borrow.owner.as_ref(), borrow.asset_mint.as_ref()],
        bump = supply.bump,
    )]
    pub supply: Account<'info, SupplyPosition>,

    #[account(
        seeds = [b"asset", borrow.asset_mint.as_ref()],
        bump = asset_config.bump,
    )]
    pub asset_config: Account<'info, AssetConfig>,

    #[account(
        mut,
        seeds = [b"currency", borrow.currency.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,

    pub price_feed: Option<Account<'info, PriceFeed>>,

    #[account(
        seeds = [b"reserve", borrow.asset_mint.as_ref()],
        bump = reserve.bump,
        seeds::program = yield_vault::ID,
    )]
    pub reserve: Account<'info, Reserve>,
}

#[event]
pub struct LoanRepaid {
    pub borrow: Pubkey,
    pub owner: Pubkey,
    pub currency: [u8; 8],
    pub amount: u64,
    pub released_collateral: u64,
    pub outstanding: u64,
    pub fully_repaid: bool,
    pub borrow_index: u128,
}

#[event]
pub struct CollateralLiquidated {
    pub borrow: Pubkey,
    pub owner: Pubkey,
    pub liquidator: Pubkey,
    pub currency: [u8; 8],
    pub released_collateral: u64,
    pub collateral_value: u64,
    pub debt_value: u64,
    pub ratio: u128,
}
