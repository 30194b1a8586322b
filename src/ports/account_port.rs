//! Account state port trait.

use crate::domain::bar::AccountState;
use crate::domain::error::FxpilotError;

pub trait AccountPort {
    fn account_state(&self) -> Result<AccountState, FxpilotError>;
}
