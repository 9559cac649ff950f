pub mod app;
pub mod aws;
pub mod child;
pub mod error;
pub mod longterm;
pub mod mfa;
pub mod otp;
pub mod profile;
pub mod run;
pub mod secrets;
pub mod select;
pub mod session;
pub mod sso;
pub mod store;
pub mod token_cache;
pub mod validate;
