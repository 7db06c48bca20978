mod repository;
mod roles;
mod third;
mod users;

pub use repository::Repository;
pub use roles::Roles;
pub use third::ThirdIdentities;
pub use users::Users;
