pub mod episodes;
pub mod faq;
pub mod roles;
pub mod usage;
