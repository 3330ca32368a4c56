//! Admin registry: protocol config, supported collateral assets, borrowable
//! currencies and their price feeds. Every record is a PDA keyed by what it
//! describes, so registering the same asset or currency twice fails at the
//! account level.

use anchor_lang::prelude::*;
use anchor_spl::token::Mint;

use crate::math::RAY;
use crate::state::{
    AssetConfig, Config, CurrencyConfig, LedgerError, PriceFeed, CURRENCY_CODE_LEN,
};

pub const MAX_DECIMALS: u8 = 18;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy)]
pub struct CurrencyParams {
    pub decimals: u8,
    pub collateralization_ratio: u128,
    pub liquidation_threshold: u128,
    pub base_rate: u128,
    pub min_rate: u128,
    pub max_rate: u128,
    pub sensitivity: u128,
}

impl CurrencyParams {
    pub fn validate(&self) -> Result<()> {
        require!(self.decimals <= MAX_DECIMALS, LedgerError::InvalidConfig);
        require!(
            self.liquidation_threshold >= RAY,
            LedgerError::InvalidConfig
        );
        require!(
            self.collateralization_ratio >= self.liquidation_threshold,
            LedgerError::InvalidConfig
        );
        require!(self.min_rate <= self.base_rate, LedgerError::InvalidConfig);
        require!(self.base_rate <= self.max_rate, LedgerError::InvalidConfig);
        Ok(())
    }
}

pub fn initialize(ctx: Context<Initialize>) -> Result<()> {
    let (_, custody_bump) =
        Pubkey::find_program_address(&[b"custody"], ctx.program_id);

    let config = &mut ctx.accounts.config;
    config.admin = ctx.accounts.admin.key();
    config.custody_authority_bump = custody_bump;
    config.paused = false;
    config.bump = ctx.bumps.config;

    msg!("ledger initialized, admin {}", config.admin);
    Ok(())
}

pub fn set_paused(ctx: Context<AdminOnly>, paused: bool) -> Result<()> {
    ctx.accounts.config.paused = paused;
    msg!("paused set to {}", paused);
    Ok(())
}

pub fn add_asset(ctx: Context<AddAsset>) -> Result<()> {
    let asset = &mut ctx.accounts.asset_config;
    asset.mint = ctx.accounts.mint.key();
    asset.decimals = ctx.accounts.mint.decimals;
    asset.is_supported = true;
    asset.bump = ctx.bumps.asset_config;

    require!(asset.decimals <= MAX_DECIMALS, LedgerError::InvalidConfig);

    emit!(AssetRegistered {
        mint: asset.mint,
        decimals: asset.decimals,
    });
    Ok(())
}

pub fn set_asset_support(ctx: Context<UpdateAsset>, is_supported: bool) -> Result<()> {
    ctx.accounts.asset_config.is_supported = is_supported;
    msg!(
        "asset {} support set to {}",
        ctx.accounts.asset_config.mint,
        is_supported
    );
    Ok(())
}

pub fn add_currency(
    ctx: Context<AddCurrency>,
    code: [u8; CURRENCY_CODE_LEN],
    params: CurrencyParams,
) -> Result<()> {
    params.validate()?;

    let currency = &mut ctx.accounts.currency;
    currency.code = code;
    currency.decimals = params.decimals;
    currency.collateralization_ratio = params.collateralization_ratio;
    currency.liquidation_threshold = params.liquidation_threshold;
    currency.price_feed = None;
    currency.base_rate = params.base_rate;
    currency.min_rate = params.min_rate;
    currency.max_rate = params.max_rate;
    currency.sensitivity = params.sensitivity;
    currency.borrow_index = RAY;
    currency.last_index_update = Clock::get()?.unix_timestamp;
    currency.bump = ctx.bumps.currency;

    emit!(CurrencyRegistered {
        code,
        decimals: params.decimals,
        collateralization_ratio: params.collateralization_ratio,
        liquidation_threshold: params.liquidation_threshold,
    });
    Ok(())
}

/// Replace a currency's risk and rate parameters. The borrow index and its
/// last update timestamp are never touched here; accrued interest survives a
/// parameter change.
pub fn update_currency(ctx: Context<UpdateCurrency>, params: CurrencyParams) -> Result<()> {
    params.validate()?;

    let currency = &mut ctx.accounts.currency;
    currency.decimals = params.decimals;
    currency.collateralization_ratio = params.collateralization_ratio;
    currency.liquidation_threshold = params.liquidation_threshold;
    currency.base_rate = params.base_rate;
    currency.min_rate = params.min_rate;
    currency.max_rate = params.max_rate;
    currency.sensitivity = params.sensitivity;

    msg!("currency updated");
    Ok(())
}

pub fn init_price_feed(ctx: Context<InitPriceFeed>, authority: Pubkey) -> Result<()> {
    require!(authority != Pubkey::default(), LedgerError::InvalidConfig);

    let feed = &mut ctx.accounts.price_feed;
    feed.authority = authority;
    feed.currency = ctx.accounts.currency.code;
    feed.price = 0;
    feed.updated_at = 0;
    feed.bump = ctx.bumps.price_feed;

    ctx.accounts.currency.price_feed = Some(feed.key());

    msg!("price feed {} attached", feed.key());
    Ok(())
}

/// Push a quote. Zero is valid and marks the feed unavailable until the
/// next nonzero push.
pub fn set_price(ctx: Context<SetPrice>, price: u64) -> Result<()> {
    let feed = &mut ctx.accounts.price_feed;
    feed.price = price;
    feed.updated_at = Clock::get()?.unix_timestamp;

    emit!(PriceUpdated {
        feed: feed.key(),
        currency: feed.currency,
        price,
        updated_at: feed.updated_at,
    });
    Ok(())
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(
        init,
        payer = admin,
        space = Config::LEN,
        seeds = [b"config"],
        bump
    )]
    pub config: Account<'info, Config>,

    #[account(mut)]
    pub admin: Signer<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct AdminOnly<'info> {
    #[account(
        mut,
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

#[derive(Accounts)]
pub struct AddAsset<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    #[account(mut)]
    pub admin: Signer<'info>,

    pub mint: Account<'info, Mint>,

    #[account(
        init,
        payer = admin,
        space = AssetConfig::LEN,
        seeds = [b"asset", mint.key().as_ref()],
        bump
    )]
    pub asset_config: Account<'info, AssetConfig>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct UpdateAsset<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [b"asset", asset_config.mint.as_ref()],
        bump = asset_config.bump,
    )]
    pub asset_config: Account<'info, AssetConfig>,
}

#[derive(Accounts)]
#[instruction(code: [u8; CURRENCY_CODE_LEN])]
pub struct AddCurrency<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(
        init,
        payer = admin,
        space = CurrencyConfig::LEN,
        seeds = [b"currency", code.as_ref()],
        bump
    )]
    pub currency: Account<'info, CurrencyConfig>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct UpdateCurrency<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [b"currency", currency.code.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,
}

#[derive(Accounts)]
pub struct InitPriceFeed<'info> {
    #[account(
        seeds = [b"config"],
        bump = config.bump,
        has_one = admin @ LedgerError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [b"currency", currency.code.as_ref()],
        bump = currency.bump,
    )]
    pub currency: Account<'info, CurrencyConfig>,

    #[account(
        init,
        payer = admin,
        space = PriceFeed::LEN,
        seeds = [b"price_feed", currency.code.as_ref()],
        bump
    )]
    pub price_feed: Account<'info, PriceFeed>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct SetPrice<'info> {
    #[account(
        mut,
        seeds = [b"price_feed", price_feed.currency.as_ref()],
        bump = price_feed.bump,
        has_one = authority @ LedgerError::Unauthorized,
    )]
    pub price_feed: Account<'info, PriceFeed>,

    pub authority: Signer<'info>,
}

#[event]
pub struct AssetRegistered {
    pub mint: Pubkey,
    pub decimals: u8,
}

#[event]
pub struct CurrencyRegistered {
    pub code: [u8; CURRENCY_CODE_LEN],
    pub decimals: u8,
    pub collateralization_ratio: u128,
    pub liquidation_threshold: u128,
}

#[event]
pub struct PriceUpdated {
    pub feed: Pubkey,
    pub currency: [u8; CURRENCY_CODE_LEN],
    pub price: u64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CurrencyParams {
        CurrencyParams {
            decimals: 2,
            collateralization_ratio: 3 * RAY / 2,
            liquidation_threshold: 6 * RAY / 5,
            base_rate: RAY / 20,
            min_rate: RAY / 100,
            max_rate: RAY / 2,
            sensitivity: RAY,
        }
    }

    #[test]
    fn well_formed_params_pass() {
        params().validate().unwrap();
    }

    #[test]
    fn threshold_must_cover_the_debt() {
        let mut p = params();
        p.liquidation_threshold = RAY - 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn ratio_must_dominate_threshold() {
        let mut p = params();
        p.collateralization_ratio = p.liquidation_threshold - 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rate_band_must_contain_the_base() {
        let mut p = params();
        p.base_rate = p.max_rate + 1;
        assert!(p.validate().is_err());

        let mut p = params();
        p.min_rate = p.base_rate + 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn decimals_are_capped() {
        let mut p = params();
        p.decimals = MAX_DECIMALS + 1;
        assert!(p.validate().is_err());
    }
}
