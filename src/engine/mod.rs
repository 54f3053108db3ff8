pub mod chat;
pub mod faq;
pub mod governor;
pub mod prompt;
pub mod provider;
pub mod rate_limiter;
pub mod tier;
