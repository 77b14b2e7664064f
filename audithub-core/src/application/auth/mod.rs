//! Account use cases and login history

pub mod login_history;
pub mod use_cases;

pub use login_history::{LoginAttempt, LoginHistoryRecorder};
pub use use_cases::{
    AuthenticatePasswordUseCase, GetAvatarUseCase, GetProfileUseCase, ListLoginHistoryUseCase,
    RegisterUseCase,
};
