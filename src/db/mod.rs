pub mod repo;

pub use repo::PgRepo;
