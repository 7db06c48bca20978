pub mod roles;
pub mod third;
pub mod users;
