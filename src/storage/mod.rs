pub mod cache;
pub mod db;
pub mod entities;
pub mod repository;

pub use cache::{CacheError, CacheStore, InMemoryCacheStore};
pub use db::init_db;
pub use repository::{ConversationRepository, FaqRepository, RepositoryError, SeaOrmRepository};
