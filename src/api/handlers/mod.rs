pub mod credentials;
pub mod health;
pub mod recording;
