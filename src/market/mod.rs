//! Marketplace accounts, sessions and listings

pub mod accounts;
pub mod listings;
pub mod models;
mod sessions;

pub use accounts::{Account, AccountService, LoginSession, NewBuyer, NewSeller};
pub use listings::{ListingService, NewOrder, NewProduct, NewReview};
pub use models::{
    AccountRole, Buyer, Order, OrderStatus, Product, Review, Seller, VerificationFlag,
    VerificationFlags,
};
pub use sessions::{Principal, Session, SessionStore};
