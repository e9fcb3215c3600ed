pub mod conversation;
pub mod identity;
pub mod watchlist;
