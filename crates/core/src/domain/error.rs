use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown difficulty: {0:?}. difficulty must be one of easy, medium, hard")]
    UnknownDifficulty(String),
}
