pub mod demo;
pub mod drive;
pub mod health;
pub mod readings;
