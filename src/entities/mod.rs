pub mod auth_code;
pub mod client;
pub mod consent;
pub mod rate_limit;
pub mod token;

pub use auth_code::Entity as AuthCode;
pub use client::Entity as Client;
pub use consent::Entity as Consent;
pub use rate_limit::Entity as RateLimit;
pub use token::Entity as Token;
