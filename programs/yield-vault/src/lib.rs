// Yield-bearing custody vault. Collateral deposited by the ledger sits in an
// SPL token vault per asset while a RAY-scaled liquidity index accrues
// linearly at the reserve's configured rate. Scaled balances held by the
// ledger are valued by multiplying with the current index, so positions grow
// without per-account writes.

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, Transfer};

pub mod math;
use math::{mul_div, RAY, SECONDS_PER_YEAR};

declare_id!("FAhQ61GKpG12pJzHPtnut92E4SQPL1mCyj1Vgts1eGjD");

#[program]
pub mod yield_vault {
    use super::*;

    /// Create a reserve for an asset. `manager` is the only key allowed to
    /// withdraw from the vault and retune the rate; the lending ledger passes
    /// its custody-authority PDA here.
    pub fn init_reserve(
        ctx: Context<InitReserve>,
        liquidity_rate: u128,
        manager: Pubkey,
    ) -> Result<()> {
        require!(liquidity_rate <= math::MAX_LIQUIDITY_RATE, VaultError::InvalidRate);

        let reserve = &mut ctx.accounts.reserve;
        reserve.asset_mint = ctx.accounts.asset_mint.key();
        reserve.vault = ctx.accounts.vault.key();
        reserve.manager = manager;
        reserve.liquidity_rate = liquidity_rate;
        reserve.liquidity_index = RAY;
        reserve.last_update_ts = Clock::get()?.unix_timestamp;
        reserve.total_deposits = 0;
        reserve.bump = ctx.bumps.reserve;
        reserve.vault_bump = ctx.bumps.vault;

        msg!("Reserve initialized for mint {}", reserve.asset_mint);
        Ok(())
    }

    /// Change the accrual rate. Accrues at the old rate up to now first so the
    /// index never retroactively reprices elapsed time.
    pub fn set_liquidity_rate(ctx: Context<ManageReserve>, liquidity_rate: u128) -> Result<()> {
        require!(liquidity_rate <= math::MAX_LIQUIDITY_RATE, VaultError::InvalidRate);

        let reserve = &mut ctx.accounts.reserve;
        reserve.accrue(Clock::get()?.unix_timestamp)?;
        reserve.liquidity_rate = liquidity_rate;

        msg!("Reserve rate updated for mint {}", reserve.asset_mint);
        Ok(())
    }

    /// Advance the liquidity index to the current timestamp. Permissionless;
    /// deposit and withdraw do this implicitly.
    pub fn accrue(ctx: Context<Accrue>) -> Result<()> {
        ctx.accounts.reserve.accrue(Clock::get()?.unix_timestamp)
    }

    /// Move `amount` of the underlying asset into custody.
    pub fn deposit(ctx: Context<Deposit>, amount: u64) -> Result<()> {
        require!(amount > 0, VaultError::InvalidAmount);

        let reserve = &mut ctx.accounts.reserve;
        reserve.accrue(Clock::get()?.unix_timestamp)?;

        let cpi_accounts = Transfer {
            from: ctx.accounts.depositor_token.to_account_info(),
            to: ctx.accounts.vault.to_account_info(),
            authority: ctx.accounts.depositor.to_account_info(),
        };
        token::transfer(
            CpiContext::new(ctx.accounts.token_program.to_account_info(), cpi_accounts),
            amount,
        )?;

        reserve.total_deposits = reserve
            .total_deposits
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow)?;

        emit!(ReserveDeposited {
            reserve: reserve.key(),
            depositor: ctx.accounts.depositor.key(),
            amount,
            liquidity_index: reserve.liquidity_index,
            total_deposits: reserve.total_deposits,
        });
        Ok(())
    }

    /// Return `amount` of the underlying asset out of custody. Only the
    /// registered manager may trigger this.
    pub fn withdraw(ctx: Context<Withdraw>, amount: u64) -> Result<()> {
        require!(amount > 0, VaultError::InvalidAmount);

        let reserve = &mut ctx.accounts.reserve;
        reserve.accrue(Clock::get()?.unix_timestamp)?;

        require!(
            amount <= ctx.accounts.vault.amount,
            VaultError::InsufficientLiquidity
        );

        let mint_key = reserve.asset_mint;
        let seeds = &[b"reserve".as_ref(), mint_key.as_ref(), &[reserve.bump]];
        let signer = &[&seeds[..]];
        let cpi_accounts = Transfer {
            from: ctx.accounts.vault.to_account_info(),
            to: ctx.accounts.recipient_token.to_account_info(),
            authority: reserve.to_account_info(),
        };
        token::transfer(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                cpi_accounts,
                signer,
            ),
            amount,
        )?;

        reserve.total_deposits = reserve.total_deposits.saturating_sub(amount);

        emit!(ReserveWithdrawn {
            reserve: reserve.key(),
            recipient: ctx.accounts.recipient_token.key(),
            amount,
            liquidity_index: reserve.liquidity_index,
            total_deposits: reserve.total_deposits,
        });
        Ok(())
    }
}

#[account]
pub struct Reserve {
    pub asset_mint: Pubkey,
    pub vault: Pubkey,
    pub manager: Pubkey,
    pub liquidity_rate: u128,  // annualized, RAY-scaled
    pub liquidity_index: u128, // RAY-scaled, starts at RAY, non-decreasing
    pub last_update_ts: i64,
    pub total_deposits: u64,
    pub bump: u8,
    pub vault_bump: u8,
}

impl Reserve {
    pub const LEN: usize = 8 + // discriminator
        32 + // asset_mint
        32 + // vault
        32 + // manager
        16 + // liquidity_rate
        16 + // liquidity_index
        8 +  // last_update_ts
        8 +  // total_deposits
        1 +  // bump
        1; // vault_bump

    /// Index the reserve would carry at `now`, without mutating state.
    pub fn normalized_income(&self, now: i64) -> Result<u128> {
        if now <= self.last_update_ts {
            return Ok(self.liquidity_index);
        }
        let elapsed = (now - self.last_update_ts) as u128;
        let accrued_fraction = self
            .liquidity_rate
            .checked_mul(elapsed)
            .ok_or(VaultError::MathOverflow)?
            .checked_div(SECONDS_PER_YEAR)
            .ok_or(VaultError::MathOverflow)?;
        let growth = RAY
            .checked_add(accrued_fraction)
            .ok_or(VaultError::MathOverflow)?;
        mul_div(self.liquidity_index, growth, RAY).ok_or(VaultError::MathOverflow.into())
    }

    pub fn accrue(&mut self, now: i64) -> Result<()> {
        if now <= self.last_update_ts {
            return Ok(());
        }
        self.liquidity_index = self.normalized_income(now)?;
        self.last_update_ts = now;
        Ok(())
    }
}

#[derive(Accounts)]
pub struct InitReserve<'info> {
    #[account(
        init,
        payer = payer,
        space = Reserve::LEN,
        seeds = [b"reserve", asset_mint.key().as_ref()],
        bump
    )]
    pub reserve: Account<'info, Reserve>,

    pub asset_mint: Account<'info, Mint>,

    #[account(
        init,
        payer = payer,
        seeds = [b"vault", reserve.key().as_ref()],
        bump,
        token::mint = asset_mint,
        token::authority = reserve
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
pub struct ManageReserve<'info> {
    #[account(mut, has_one = manager @ VaultError::Unauthorized)]
    pub reserve: Account<'info, Reserve>,
    pub manager: Signer<'info>,
}

#[derive(Accounts)]
pub struct Accrue<'info> {
    #[account(mut)]
    pub reserve: Account<'info, Reserve>,
}

#[derive(Accounts)]
pub struct Deposit<'info> {
    #[account(mut, has_one = vault @ VaultError::InvalidVault)]
    pub reserve: Account<'info, Reserve>,

    pub depositor: Signer<'info>,

    #[account(mut)]
    pub depositor_token: Account<'info, TokenAccount>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct Withdraw<'info> {
    #[account(
        mut,
        has_one = vault @ VaultError::InvalidVault,
        has_one = manager @ VaultError::Unauthorized,
    )]
    pub reserve: Account<'info, Reserve>,

    pub manager: Signer<'info>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub recipient_token: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

#[event]
pub struct ReserveDeposited {
    pub reserve: Pubkey,
    pub depositor: Pubkey,
    pub amount: u64,
    pub liquidity_index: u128,
    pub total_deposits: u64,
}

#[event]
pub struct ReserveWithdrawn {
    pub reserve: Pubkey,
    pub recipient: Pubkey,
    pub amount: u64,
    pub liquidity_index: u128,
    pub total_deposits: u64,
}

#[error_code]
pub enum VaultError {
    #[msg("Amount must be greater than zero")]
    InvalidAmount,
    #[msg("Liquidity rate out of bounds")]
    InvalidRate,
    #[msg("Insufficient liquidity in vault")]
    InsufficientLiquidity,
    #[msg("Unauthorized")]
    Unauthorized,
    #[msg("Vault does not match reserve")]
    InvalidVault,
    #[msg("Arithmetic overflow")]
    MathOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserve(rate: u128, last: i64) -> Reserve {
        Reserve {
            asset_mint: Pubkey::new_unique(),
            vault: Pubkey::new_unique(),
            manager: Pubkey::new_unique(),
            liquidity_rate: rate,
            liquidity_index: RAY,
            last_update_ts: last,
            total_deposits: 0,
            bump: 255,
            vault_bump: 254,
        }
    }

    #[test]
    fn income_is_flat_without_elapsed_time() {
        let r = reserve(RAY / 20, 1_000);
        assert_eq!(r.normalized_income(1_000).unwrap(), RAY);
        assert_eq!(r.normalized_income(999).unwrap(), RAY);
    }

    #[test]
    fn income_after_one_year_matches_rate() {
        // 4% over exactly one year: index = 1.04 RAY
        let r = reserve(RAY / 25, 0);
        let idx = r.normalized_income(SECONDS_PER_YEAR as i64).unwrap();
        assert_eq!(idx, RAY + RAY / 25);
    }

    #[test]
    fn accrue_compounds_across_calls() {
        let mut r = reserve(RAY / 10, 0);
        let half = SECONDS_PER_YEAR as i64 / 2;
        r.accrue(half).unwrap();
        let mid = r.liquidity_index;
        assert_eq!(mid, RAY + RAY / 20);
        r.accrue(2 * half).unwrap();
        // second half accrues on the grown index, so strictly more than 1.10
        assert!(r.liquidity_index > RAY + RAY / 10);
        assert_eq!(r.last_update_ts, 2 * half);
    }

    #[test]
    fn accrue_is_monotone() {
        let mut r = reserve(RAY / 100, 0);
        let mut prev = r.liquidity_index;
        for t in [10i64, 1_000, 50_000, 10_000_000] {
            r.accrue(t).unwrap();
            assert!(r.liquidity_index >= prev);
            prev = r.liquidity_index;
        }
    }
}
