pub mod article;
pub mod conversation;
pub mod information;
pub mod opportunity;
