pub mod auth;
pub mod dashboard;
pub mod doctors;
pub mod health;
pub mod patients;
pub mod users;
