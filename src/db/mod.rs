//! Credential store: MongoDB client, document schemas, and the store trait.

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::MemoryUserStore;
pub use mongo::MongoClient;
pub use store::{MongoUserStore, NewUser, UserStore};
