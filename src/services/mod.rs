pub mod formatting;
pub mod invites;
pub mod mail;
pub mod notifications;
pub mod repository;
pub mod validator;
pub mod workflow;
