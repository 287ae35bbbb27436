pub mod board;
pub mod config;
pub mod game;
pub mod leaky_bucket;
pub mod matchmaker;
pub mod persistence;
pub mod sandbox;
pub mod sdk;
pub mod side;
pub mod vector;
pub mod wire;
