// Infrastructure layer module
// Contains database adapters for the run store
// Follows Hexagonal Architecture

pub mod repositories;
