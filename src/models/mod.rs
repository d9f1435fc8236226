pub mod user;

pub use user::{TwoFactorState, User};
