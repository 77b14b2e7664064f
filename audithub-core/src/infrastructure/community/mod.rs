//! SQLx persistence for comments, votes, ratings, and the reputation ledger

pub mod comment_repository;
pub mod rating_repository;
pub mod reputation_repository;

pub use comment_repository::{SqlxCommentRepository, SqlxVoteRepository};
pub use rating_repository::SqlxRatingRepository;
pub use reputation_repository::SqlxReputationRepository;
