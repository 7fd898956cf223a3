pub mod helpers;
mod property;
