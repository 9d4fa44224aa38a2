//! SetTestTime instruction handler
//!
//! Sets a custom wall clock time for test builds. Only available when the
//! program is compiled with the "test" feature, where `Vault::get_time`
//! reads `inception_time` instead of the Clock sysvar.

use {
    crate::{error::VaultError, state::vault::Vault},
    anchor_lang::prelude::*,
};

/// Accounts required for setting the test time
#[derive(Accounts)]
pub struct SetTestTime<'info> {
    /// Vault authority (must sign)
    #[account()]
    pub authority: Signer<'info>,

    /// Vault account (mutable, inception_time will be updated)
    #[account(
        mut,
        has_one = authority,
        seeds = [b"vault"],
        bump = vault.vault_bump
    )]
    pub vault: Box<Account<'info, Vault>>,
}

/// Parameters for setting the test time
#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct SetTestTimeParams {
    /// Custom time value (Unix timestamp)
    pub time: i64,
}

/// Set the wall clock time for test builds
///
/// Fails with `InvalidEnvironment` unless compiled with the "test"
/// feature. Affects every time-dependent computation in the program.
///
/// # Arguments
/// * `ctx` - Context containing all required accounts
/// * `params` - The time to set
///
/// # Returns
/// `Result<()>` - Success if the time was updated
pub fn set_test_time(ctx: Context<SetTestTime>, params: &SetTestTimeParams) -> Result<()> {
    if !cfg!(feature = "test") {
        return err!(VaultError::InvalidEnvironment);
    }

    ctx.accounts.vault.inception_time = params.time;

    Ok(())
}
