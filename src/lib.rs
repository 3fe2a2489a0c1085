pub mod application;
pub mod domain;
pub mod interfaces;
pub mod security;
pub mod storage;
