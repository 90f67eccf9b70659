use anyhow::{bail, Result};

use super::state::AccountingState;

/// Makes `index` the only activity accruing time. Already accrued time stays where it is.
pub fn select_activity(mut state: AccountingState, index: usize) -> Result<AccountingState> {
    if index >= state.activities.len() {
        bail!(
            "There is no activity number {}, only {} are configured",
            index + 1,
            state.activities.len()
        );
    }
    state.active = Some(index);
    Ok(state)
}

/// Hands the running time back to "Other".
pub fn select_other(mut state: AccountingState) -> AccountingState {
    state.active = None;
    state
}
